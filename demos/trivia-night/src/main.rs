use quizhall::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Where to listen and which questions to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    bind: String,
    catalog_path: Option<String>,
}

impl Settings {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            bind: get("QUIZHALL_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            catalog_path: get("QUIZHALL_CATALOG"),
        }
    }

    fn load_catalog(&self) -> Result<QuestionCatalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => {
                let catalog = QuestionCatalog::from_json_file(path)?;
                tracing::info!(%path, sets = catalog.len(), "loaded question catalog");
                Ok(catalog)
            }
            None => Ok(QuestionCatalog::builtin()),
        }
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), QuizhallError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let catalog = settings.load_catalog()?;

    let server = QuizhallServer::builder()
        .bind(&settings.bind)
        .catalog(catalog)
        .build(CallerIdentity)
        .await?;

    tracing::info!(addr = %settings.bind, "trivia night is open");
    server.run().await
}
