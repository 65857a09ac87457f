use anyhow::Context;
use salesdesk_core::{LabelNormalizer, NormalizerConfig};
use salesdesk_import::ExecutiveDirectory;
use salesdesk_storage::DbPool;
use std::sync::Arc;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub normalizer: Arc<LabelNormalizer>,
    pub executives: Option<Arc<ExecutiveDirectory>>,
}

impl AppState {
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let db = salesdesk_storage::create_db(&config.db_path)
            .await
            .with_context(|| format!("opening database {}", config.db_path.display()))?;

        let normalizer_config = match &config.aliases_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                NormalizerConfig::from_toml(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => NormalizerConfig::default(),
        };
        for (earlier, later) in normalizer_config.overlapping_aliases() {
            tracing::warn!(%earlier, %later, "alias of an earlier entry shadows a later one");
        }
        let normalizer = Arc::new(LabelNormalizer::new(normalizer_config));

        let executives = match &config.executives_path {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("opening {}", path.display()))?;
                let directory = ExecutiveDirectory::from_csv(file, &normalizer)
                    .with_context(|| format!("loading {}", path.display()))?;
                Some(Arc::new(directory))
            }
            None => None,
        };

        Ok(Self {
            db,
            normalizer,
            executives,
        })
    }
}
