pub mod briefing;

pub use briefing::{
    AnthropicSettings, BriefingConfig, BriefingSettings, CategoryLabels, ChoiceSettings,
    ImportanceLabels, NotionSettings, RetrySettings, Stages,
};
