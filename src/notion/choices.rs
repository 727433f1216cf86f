//! Explicit enum → select-option table for the briefing database.
//!
//! Notion rejects select values that are not configured on the column, so the
//! map fails closed: a blank label falls back to the default choice's label.

use crate::config::ChoiceSettings;
use crate::schema::{Category, Importance};

#[derive(Debug, Clone)]
pub struct ChoiceMap {
    categories: Vec<(Category, String)>,
    importances: Vec<(Importance, String)>,
}

impl Default for ChoiceMap {
    fn default() -> Self {
        Self::from_settings(&ChoiceSettings::default())
    }
}

impl ChoiceMap {
    pub fn from_settings(s: &ChoiceSettings) -> Self {
        let categories = Category::ALL
            .iter()
            .filter_map(|c| non_blank(s.category.get(*c)).map(|l| (*c, l)))
            .collect();
        let importances = Importance::ALL
            .iter()
            .filter_map(|i| non_blank(s.importance.get(*i)).map(|l| (*i, l)))
            .collect();
        Self {
            categories,
            importances,
        }
    }

    pub fn category(&self, c: Category) -> &str {
        lookup(&self.categories, c)
            .or_else(|| lookup(&self.categories, Category::FALLBACK))
            .unwrap_or(Category::FALLBACK.default_label())
    }

    pub fn importance(&self, i: Importance) -> &str {
        lookup(&self.importances, i)
            .or_else(|| lookup(&self.importances, Importance::DEFAULT))
            .unwrap_or(Importance::DEFAULT.default_label())
    }

    /// Labels in enum order, for the prompt.
    pub fn category_labels(&self) -> Vec<&str> {
        Category::ALL.iter().map(|c| self.category(*c)).collect()
    }

    pub fn importance_labels(&self) -> Vec<&str> {
        Importance::ALL.iter().map(|i| self.importance(*i)).collect()
    }
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn lookup<K: PartialEq + Copy>(table: &[(K, String)], key: K) -> Option<&str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, l)| l.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_uses_table_labels() {
        let m = ChoiceMap::default();
        assert_eq!(m.category(Category::Benchmark), "📊 벤치마크");
        assert_eq!(m.importance(Importance::High), "🔥 High");
        assert_eq!(m.category_labels().len(), 5);
    }

    #[test]
    fn blank_label_fails_closed_to_default_choice() {
        let mut s = ChoiceSettings::default();
        s.category.infra_tooling = "  ".into();
        s.importance.low = String::new();
        let m = ChoiceMap::from_settings(&s);
        assert_eq!(m.category(Category::InfraTooling), "📄 논문/연구");
        assert_eq!(m.importance(Importance::Low), "⭐ Medium");
    }

    #[test]
    fn renamed_fallback_is_honoured() {
        let mut s = ChoiceSettings::default();
        s.category.paper_research = "Research".into();
        s.category.benchmark = String::new();
        let m = ChoiceMap::from_settings(&s);
        assert_eq!(m.category(Category::Benchmark), "Research");
    }
}
