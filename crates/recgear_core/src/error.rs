use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("`{item}` needs a `{parameter}` parameter on the referencing template: {template}")]
    OverrideMissing {
        item: String,
        parameter: String,
        template: String,
    },
    #[error("resolution cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
    #[error("resolution of `{item}` exceeded depth {limit}")]
    DepthExceeded { item: String, limit: usize },
    #[error("failed to fetch `{title}`")]
    Fetch {
        title: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to record resolution state")]
    Storage(#[source] anyhow::Error),
}

impl ResolveError {
    pub fn fetch(title: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Fetch {
            title: title.into(),
            source,
        }
    }
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
