pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod errors;
pub mod services;
pub mod tui;
pub mod ui;

use std::sync::Arc;

use app::{AppBuilder, Application};
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::core::executor::Gateways;
use crate::core::io::LocalIo;
use crate::core::r#loop::AppLoop;
use crate::core::state::RootState;
use crate::domain::drafts::DraftStore;
use crate::services::kafka::KafkaBroker;
use crate::services::registry::HttpRegistry;
use crate::services::Broker;
use crate::tui::Tui;
use crate::ui::profile_picker;
use crate::ui::Theme;

pub struct Schemacast;

impl Application for Schemacast {
    const APP_ID: &'static str = "schemacast";
}

/// Start a session. Returns once the user quits.
///
/// Configuration problems (unreadable profile file, unknown profile, missing
/// registry url, unusable broker settings) end the process with an error
/// before the main loop starts.
pub async fn run(cli: Cli) -> Result<()> {
    errors::init()?;
    let context = AppBuilder::<Schemacast>::new(env!("CARGO_PKG_VERSION"))
        .map_err(|err| eyre!("initialising {}: {err}", Schemacast::APP_ID))?
        .build();
    let paths = context.path_context().clone();
    let theme = Theme::from_env();

    let config_path = paths.config_file();
    let mut file = match crate::config::ensure_config_file(&config_path) {
        Ok(file) => Some(file),
        Err(err) if cli.select_config => return Err(err.into()),
        Err(err) => {
            warn!(error = %err, "profile file unusable, falling back to environment");
            None
        }
    };

    let mut tui = Tui::new()?;
    let selected = if cli.select_config {
        let Some(file) = file.as_mut() else {
            bail!("no configuration profiles to select from");
        };
        tui.enter()?;
        match profile_picker::pick(&mut tui, file, &config_path, &theme).await? {
            Some(key) => Some(key),
            None => {
                tui.exit()?;
                return Ok(());
            }
        }
    } else {
        None
    };

    let settings = crate::config::resolve(file.as_ref(), selected.as_deref(), None)?;
    info!(
        profile = %settings.label,
        registry = %settings.registry.url,
        brokers = %settings.kafka.bootstrap_servers,
        "settings resolved"
    );

    let registry = Arc::new(HttpRegistry::new(&settings.registry)?);
    let broker: Option<Arc<dyn Broker>> = if settings.kafka.is_configured() {
        Some(Arc::new(KafkaBroker::new(settings.kafka.clone())?))
    } else {
        warn!("no bootstrap servers configured; publish and consume disabled");
        None
    };

    let state = RootState::new(settings.label.clone(), broker.is_some());
    let local = LocalIo::new(DraftStore::new(paths));
    let gateways = Gateways { registry, broker };

    if !cli.select_config {
        tui.enter()?;
    }
    AppLoop::new(state, tui, theme, local, gateways).run().await
}
