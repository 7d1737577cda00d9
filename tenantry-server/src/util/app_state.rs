use std::sync::Arc;

use crate::{config::AppConfig, db::Mongo, mail::Mailer};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mongo>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
}
