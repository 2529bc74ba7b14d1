//! Knowledge domains: validation, capabilities and the active corpus.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AppConfig, SearchConfig};
use crate::embed::Embedder;
use crate::errors::RagError;
use crate::index::store::StoreLayout;
use crate::record::{RetrievalResult, SearchQuery};
use crate::retriever::Retriever;

/// Tools a domain can answer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Retrieval over the domain's PDF corpus.
    Pdf,
    /// Encyclopedia lookup performed by the caller.
    Wikipedia,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Pdf => f.write_str("pdf"),
            Tool::Wikipedia => f.write_str("wikipedia"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCapabilities {
    pub primary: Tool,
    pub fallbacks: Vec<Tool>,
}

impl DomainCapabilities {
    /// Tools in the order they should be tried.
    pub fn tools(&self) -> impl Iterator<Item = Tool> + '_ {
        std::iter::once(self.primary).chain(self.fallbacks.iter().copied())
    }
}

/// Closed set of domains resolved at startup, plus the current selection.
#[derive(Debug, Clone)]
pub struct DomainSelector {
    capabilities: BTreeMap<String, DomainCapabilities>,
    order: Vec<String>,
    current: String,
}

impl DomainSelector {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, RagError> {
        let mut capabilities = BTreeMap::new();
        for d in &cfg.domains {
            let fallbacks = if cfg.wikipedia_domains.contains(d) {
                vec![Tool::Wikipedia]
            } else {
                Vec::new()
            };
            capabilities.insert(
                d.clone(),
                DomainCapabilities {
                    primary: Tool::Pdf,
                    fallbacks,
                },
            );
        }

        let mut selector = Self {
            capabilities,
            order: cfg.domains.clone(),
            current: String::new(),
        };
        selector.current = selector.validate(&cfg.default_domain)?;
        Ok(selector)
    }

    /// Lower-cases `name` and checks it against the configured domains.
    pub fn validate(&self, name: &str) -> Result<String, RagError> {
        let name = name.trim().to_lowercase();
        if self.capabilities.contains_key(&name) {
            Ok(name)
        } else {
            Err(RagError::unknown_domain(name, &self.order))
        }
    }

    pub fn current_domain(&self) -> &str {
        &self.current
    }

    /// Makes `name` the current domain; the previous one stays on error.
    pub fn switch_domain(&mut self, name: &str) -> Result<&str, RagError> {
        let name = self.validate(name)?;
        if name != self.current {
            info!(target: "doc_rag::domain", from = %self.current, to = %name, "domain switched");
            self.current = name;
        }
        Ok(&self.current)
    }

    pub fn capabilities(&self, name: &str) -> Option<&DomainCapabilities> {
        self.capabilities.get(&name.trim().to_lowercase())
    }

    /// Configured domains in declaration order.
    pub fn domains(&self) -> &[String] {
        &self.order
    }
}

struct ActiveState {
    selector: DomainSelector,
    retriever: Option<Arc<Retriever>>,
}

/// Current domain and its loaded retriever.
///
/// Queries clone the `Arc<Retriever>` out of the lock and run without it, so a
/// refresh or switch only affects queries issued afterwards.
pub struct ActiveCorpus {
    data_root: PathBuf,
    embedder: Arc<dyn Embedder>,
    search: SearchConfig,
    state: RwLock<ActiveState>,
}

impl ActiveCorpus {
    /// Starts on the configured default domain with nothing loaded.
    pub fn new(cfg: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Self, RagError> {
        Ok(Self {
            data_root: cfg.data_root.clone(),
            embedder,
            search: cfg.search,
            state: RwLock::new(ActiveState {
                selector: DomainSelector::from_config(cfg)?,
                retriever: None,
            }),
        })
    }

    pub fn current_domain(&self) -> String {
        self.read().selector.current_domain().to_string()
    }

    pub fn capabilities(&self) -> Option<DomainCapabilities> {
        let state = self.read();
        state
            .selector
            .capabilities(state.selector.current_domain())
            .cloned()
    }

    /// Retriever serving the current domain, if one is loaded.
    pub fn snapshot(&self) -> Option<Arc<Retriever>> {
        self.read().retriever.clone()
    }

    /// Reloads the current domain's active generation.
    ///
    /// # Errors
    /// Load errors; the previous snapshot stays installed.
    pub fn refresh(&self) -> Result<Arc<Retriever>, RagError> {
        let domain = self.current_domain();
        let retriever = Arc::new(self.load(&domain)?);
        let mut state = self.write();
        if state.selector.current_domain() == domain {
            state.retriever = Some(retriever.clone());
        }
        Ok(retriever)
    }

    /// Switches domain and loads its corpus.
    ///
    /// A domain without a built index is selected with no snapshot (`Ok(None)`).
    /// Any other load error leaves the previous domain and snapshot in place.
    pub fn switch_domain(&self, name: &str) -> Result<Option<Arc<Retriever>>, RagError> {
        let domain = self.read().selector.validate(name)?;
        let retriever = match self.load(&domain) {
            Ok(r) => Some(Arc::new(r)),
            Err(RagError::IndexNotFound(path)) => {
                warn!(target: "doc_rag::domain", domain = %domain, path = %path.display(), "domain has no index yet");
                None
            }
            Err(e) => return Err(e),
        };

        let mut state = self.write();
        state.selector.switch_domain(&domain)?;
        state.retriever = retriever.clone();
        Ok(retriever)
    }

    /// Searches the current snapshot; empty when nothing is loaded.
    pub fn search(&self, query: SearchQuery<'_>) -> Result<Vec<RetrievalResult>, RagError> {
        match self.snapshot() {
            Some(r) => r.search(query),
            None => {
                warn!(target: "doc_rag::domain", domain = %self.current_domain(), "no corpus loaded");
                Ok(Vec::new())
            }
        }
    }

    fn load(&self, domain: &str) -> Result<Retriever, RagError> {
        let layout = StoreLayout::for_domain(&self.data_root, domain);
        Retriever::load(layout.root(), self.embedder.clone(), self.search)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ActiveState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ActiveState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
