use std::sync::Arc;

use courier_wire::{Codec, CodecSet};

/// Maps endpoint paths (`<base path>/<codec name>`) to codecs.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    endpoints: Vec<(String, Arc<dyn Codec>)>,
}

impl EndpointTable {
    /// One endpoint per codec under `base_path`.
    #[must_use]
    pub fn new(base_path: &str, codecs: &CodecSet) -> Self {
        let base = base_path.trim_end_matches('/');
        let endpoints = codecs
            .iter()
            .map(|codec| (format!("{base}/{}", codec.name()), Arc::clone(codec)))
            .collect();
        Self { endpoints }
    }

    /// Codec served at `path`. Query strings, fragments and trailing slashes
    /// are ignored.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<Arc<dyn Codec>> {
        let path = path.split(['?', '#']).next().unwrap_or(path).trim();
        let path = match path.trim_end_matches('/') {
            "" => path,
            trimmed => trimmed,
        };
        self.endpoints
            .iter()
            .find(|(endpoint, _)| endpoint == path)
            .map(|(_, codec)| Arc::clone(codec))
    }

    /// Served paths in codec preference order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|(path, _)| path.as_str())
    }
}
