//! DOM access for browser-engine accessible objects.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Kind of a DOM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomNodeType {
    Element,
    Text,
    Document,
    Other(u16),
}

impl DomNodeType {
    /// Map a DOM `nodeType` number.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Element,
            3 => Self::Text,
            9 => Self::Document,
            other => Self::Other(other),
        }
    }
}

/// Basic facts about a DOM node, fetched in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomNodeInfo {
    /// Tag name as the engine reports it, e.g. `"A"` or `"div"`.
    pub tag: String,
    /// Text of a text node; empty otherwise.
    pub text: String,
    pub node_type: DomNodeType,
    pub child_count: usize,
}

/// A DOM node of a browser engine.
pub trait DomNode: Send + Sync + fmt::Debug {
    fn info(&self) -> Result<DomNodeInfo>;

    /// All attributes in document order.
    fn attributes(&self) -> Result<Vec<(String, String)>>;

    fn child(&self, index: usize) -> Result<Arc<dyn DomNode>>;

    /// Native inner HTML, if the engine provides it.
    fn inner_html(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Native outer HTML, if the engine provides it.
    fn outer_html(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn scroll_into_view(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Value of one attribute, matched case-insensitively. Missing attributes
    /// read as `None`.
    fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .attributes()?
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_codes() {
        assert_eq!(DomNodeType::from_code(1), DomNodeType::Element);
        assert_eq!(DomNodeType::from_code(3), DomNodeType::Text);
        assert_eq!(DomNodeType::from_code(9), DomNodeType::Document);
        assert_eq!(DomNodeType::from_code(8), DomNodeType::Other(8));
    }
}
