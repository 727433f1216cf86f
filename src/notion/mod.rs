// src/notion/mod.rs
pub mod choices;
pub mod client;
pub mod mapper;
pub mod uploader;

pub use choices::ChoiceMap;
pub use client::{ApiError, NotionClient, PageApi, PageId, StatusClass};
pub use mapper::{map_item, MapperSettings, PagePayload};
pub use uploader::{RetryPolicy, UploadOutcome, Uploader};
