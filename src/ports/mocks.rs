use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::provider::{FetchError, Page, PageRequest, PageSource};
use crate::domain::Record;

type Handler<R> = Box<dyn Fn(&PageRequest) -> Result<Page<R>, FetchError> + Send + Sync>;

enum Script<R> {
    /// Serve slices of a fixed dataset by offset and limit
    Dataset(Vec<R>),
    /// Pop one canned response per call, then serve empty pages
    Responses(Mutex<VecDeque<Result<Page<R>, FetchError>>>),
    /// Compute each response from the request
    Handler(Handler<R>),
}

/// Page source that records calls and serves controlled responses
pub struct ScriptedSource<R> {
    name: String,
    paginated: bool,
    script: Script<R>,
    calls: Arc<Mutex<Vec<PageRequest>>>,
}

impl<R: Record> ScriptedSource<R> {
    fn with_script(name: &str, script: Script<R>) -> Self {
        Self {
            name: name.to_string(),
            paginated: true,
            script,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dataset(name: &str, records: Vec<R>) -> Self {
        Self::with_script(name, Script::Dataset(records))
    }

    pub fn responses(name: &str, responses: Vec<Result<Page<R>, FetchError>>) -> Self {
        Self::with_script(name, Script::Responses(Mutex::new(responses.into())))
    }

    pub fn handler<F>(name: &str, handler: F) -> Self
    where
        F: Fn(&PageRequest) -> Result<Page<R>, FetchError> + Send + Sync + 'static,
    {
        Self::with_script(name, Script::Handler(Box::new(handler)))
    }

    /// Builder method to mark the source as single-call
    pub fn single_page(mut self) -> Self {
        self.paginated = false;
        self
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<PageRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl<R: Record> PageSource for ScriptedSource<R> {
    type Record = R;

    fn name(&self) -> &str {
        &self.name
    }

    fn paginated(&self) -> bool {
        self.paginated
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<R>, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        match &self.script {
            Script::Dataset(records) if !self.paginated => Ok(Page::new(records.clone())),
            Script::Dataset(records) => {
                let start = request.offset.min(records.len());
                let end = request.offset.saturating_add(request.limit).min(records.len());
                Ok(Page::new(records[start..end].to_vec()))
            }
            Script::Responses(queue) => queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .unwrap_or_else(|| Ok(Page::new(Vec::new()))),
            Script::Handler(handler) => handler(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenSecurity;

    fn security(address: &str) -> TokenSecurity {
        TokenSecurity {
            token_address: address.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dataset_slices_by_offset() {
        let source = ScriptedSource::dataset("sec", vec![security("a"), security("b"), security("c")]);

        let page = source.fetch_page(&PageRequest::default().at(2, 2)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_responses_then_empty() {
        let source = ScriptedSource::<TokenSecurity>::responses(
            "sec",
            vec![Err(FetchError::Transient("down".into()))],
        );

        assert!(source.fetch_page(&PageRequest::default()).await.is_err());
        assert!(source.fetch_page(&PageRequest::default()).await.unwrap().is_empty());
        assert_eq!(source.calls().len(), 2);
    }
}
