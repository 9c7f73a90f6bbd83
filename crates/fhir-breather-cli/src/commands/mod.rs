pub mod ask;
pub mod chat;
pub mod config;
pub mod inspect;
pub mod status;

use std::sync::Arc;

use anyhow::Result;
use fhir_breather_core::{
    AdtConverter, ChatModel, OpenAiChatModel, QueryExecutor, Session, SpecLoader,
};

use crate::config::Settings;

/// Model-backed pieces of the pipeline, built once per invocation.
pub struct Pipeline {
    pub executor: QueryExecutor,
    pub converter: AdtConverter,
}

impl Pipeline {
    pub fn new(settings: &Settings) -> Self {
        // An absent key is reported by the session before any model call.
        let api_key = settings.credentials.api_key().unwrap_or_default();
        let model: Arc<dyn ChatModel> = Arc::new(
            OpenAiChatModel::new(api_key)
                .with_api_base(&settings.api_base)
                .with_model(&settings.model),
        );
        Self {
            executor: QueryExecutor::with_model(Arc::clone(&model)),
            converter: AdtConverter::new(model),
        }
    }
}

pub fn spec_loader(settings: &Settings) -> SpecLoader {
    SpecLoader::new().with_discovery_url(&settings.discovery_url)
}

/// A session with credentials checked and the spec loaded.
pub async fn open_session(settings: &Settings) -> Result<Session> {
    let mut session = Session::new(settings.credentials.clone());
    session.load_spec(&spec_loader(settings)).await?;
    Ok(session)
}
