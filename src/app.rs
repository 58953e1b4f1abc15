use std::sync::Arc;

use bistro_core::{AccessToken, Session, SheetsClient, SyncCoordinator};

use crate::commands::CommandError;
use crate::config::Config;

/// A signed-in connection to the configured spreadsheet.
pub struct App {
    pub coordinator: Arc<SyncCoordinator<SheetsClient>>,
    pub session: Arc<Session>,
}

impl App {
    /// Signs in with the configured token and loads both sheets.
    pub async fn open(config: &Config) -> Result<Self, CommandError> {
        let spreadsheet_id = config
            .spreadsheet_id
            .value
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(CommandError::NotConfigured(
                "spreadsheet_id (or BISTRO_SPREADSHEET_ID)",
            ))?;
        let token = config
            .access_token
            .value
            .clone()
            .and_then(AccessToken::new)
            .ok_or(CommandError::NotConfigured(
                "access_token (or BISTRO_ACCESS_TOKEN)",
            ))?;

        let client = SheetsClient::with_base_url(spreadsheet_id, config.api_base_url.value.clone());
        let coordinator = SyncCoordinator::new(client)
            .with_layout(config.layout())
            .with_missing_row_policy(config.sheets.missing_row);
        let session = Session::sign_in(token);

        coordinator.load_all(&session).await?;
        tracing::debug!(
            "Loaded {} product(s) and {} order(s)",
            session.products().await.len(),
            session.orders().await.len()
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
            session: Arc::new(session),
        })
    }

    /// Ends the session, clearing the local cache.
    pub async fn close(self) {
        self.session.sign_out().await;
    }
}
