//! HTML snapshot implementation of [`Element`].
//!
//! A document is parsed once. Tags, attributes and parents of every element
//! are copied into a table keyed by the element's position in the parse
//! tree, so navigation and attribute reads never touch the tree. Selector
//! queries run against the parsed `Html`, which sits behind a mutex because
//! its nodes cache lazily and are not `Sync`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use lightbox_core::error::AppError;
use lightbox_core::traits::Element;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

#[derive(Debug)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
}

struct Snapshot {
    html: Mutex<Html>,
    page_url: Option<String>,
    nodes: HashMap<usize, NodeData>,
    root: Option<usize>,
}

impl Snapshot {
    fn html(&self) -> MutexGuard<'_, Html> {
        self.html.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Positions of the elements under `scope` (the whole document when
    /// `None`) that match `selector`, in document order.
    fn matching(&self, scope: Option<usize>, selector: &Selector) -> Vec<usize> {
        let html = self.html();
        let matched: HashSet<_> = match scope {
            None => html.select(selector).map(|el| el.id()).collect(),
            Some(pos) => match html.tree.nodes().nth(pos).and_then(ElementRef::wrap) {
                Some(scope) => scope.select(selector).map(|el| el.id()).collect(),
                None => return Vec::new(),
            },
        };
        if matched.is_empty() {
            return Vec::new();
        }
        html.tree
            .nodes()
            .enumerate()
            .filter(|(_, node)| matched.contains(&node.id()))
            .map(|(pos, _)| pos)
            .collect()
    }
}

/// A parsed HTML page.
#[derive(Clone)]
pub struct HtmlDocument {
    snapshot: Arc<Snapshot>,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self::parse_with_url(source, None)
    }

    /// Parses `source` as the page served at `page_url`.
    pub fn parse_with_url(source: &str, page_url: Option<&str>) -> Self {
        let html = Html::parse_document(source);
        let positions: HashMap<_, usize> = html
            .tree
            .nodes()
            .enumerate()
            .map(|(pos, node)| (node.id(), pos))
            .collect();

        let mut nodes = HashMap::new();
        let mut root = None;
        for (pos, node) in html.tree.nodes().enumerate() {
            let Some(element) = node.value().as_element() else {
                continue;
            };
            let parent = node
                .parent()
                .filter(|p| p.value().is_element())
                .and_then(|p| positions.get(&p.id()).copied());
            if parent.is_none() && root.is_none() {
                root = Some(pos);
            }
            nodes.insert(
                pos,
                NodeData {
                    tag: element.name().to_lowercase(),
                    attrs: element
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    parent,
                },
            );
        }

        Self {
            snapshot: Arc::new(Snapshot {
                html: Mutex::new(html),
                page_url: page_url.map(str::to_string),
                nodes,
                root,
            }),
        }
    }

    pub fn page_url(&self) -> Option<&str> {
        self.snapshot.page_url.as_deref()
    }

    /// The `<html>` element.
    pub fn root(&self) -> Option<HtmlElement> {
        self.snapshot.root.map(|pos| self.element_at(pos))
    }

    /// All elements matching `selector`, in document order.
    pub fn select(&self, selector: &str) -> Result<Vec<HtmlElement>, AppError> {
        let parsed =
            Selector::parse(selector).map_err(|_| AppError::InvalidSelector(selector.into()))?;
        Ok(self
            .snapshot
            .matching(None, &parsed)
            .into_iter()
            .map(|pos| self.element_at(pos))
            .collect())
    }

    pub fn select_first(&self, selector: &str) -> Result<Option<HtmlElement>, AppError> {
        Ok(self.select(selector)?.into_iter().next())
    }

    fn element_at(&self, pos: usize) -> HtmlElement {
        HtmlElement {
            snapshot: Arc::clone(&self.snapshot),
            pos,
        }
    }
}

impl fmt::Debug for HtmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlDocument")
            .field("page_url", &self.snapshot.page_url)
            .field("elements", &self.snapshot.nodes.len())
            .finish()
    }
}

/// Handle to one element of an [`HtmlDocument`].
#[derive(Clone)]
pub struct HtmlElement {
    snapshot: Arc<Snapshot>,
    pos: usize,
}

impl HtmlElement {
    fn data(&self) -> Option<&NodeData> {
        self.snapshot.nodes.get(&self.pos)
    }

    fn sibling(&self, pos: usize) -> Self {
        Self {
            snapshot: Arc::clone(&self.snapshot),
            pos,
        }
    }
}

fn compile(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(selector, error = ?e, "Invalid selector, matching nothing");
            None
        }
    }
}

impl Element for HtmlElement {
    fn tag_name(&self) -> String {
        self.data().map(|d| d.tag.clone()).unwrap_or_default()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.data()?
            .attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn parent(&self) -> Option<Self> {
        self.data()?.parent.map(|pos| self.sibling(pos))
    }

    fn closest(&self, selector: &str) -> Option<Self> {
        let selector = compile(selector)?;
        let html = self.snapshot.html();
        let nodes: Vec<_> = html.tree.nodes().collect();

        let mut current = Some(self.pos);
        while let Some(pos) = current {
            if let Some(el) = nodes.get(pos).copied().and_then(ElementRef::wrap)
                && selector.matches(&el)
            {
                return Some(self.sibling(pos));
            }
            current = self.snapshot.nodes.get(&pos).and_then(|d| d.parent);
        }
        None
    }

    fn query_all(&self, selector: &str) -> Vec<Self> {
        let Some(selector) = compile(selector) else {
            return Vec::new();
        };
        self.snapshot
            .matching(Some(self.pos), &selector)
            .into_iter()
            .filter(|&pos| pos != self.pos)
            .map(|pos| self.sibling(pos))
            .collect()
    }

    fn is_same_node(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.snapshot, &other.snapshot) && self.pos == other.pos
    }

    fn page_url(&self) -> Option<String> {
        self.snapshot.page_url.clone()
    }
}

impl fmt::Debug for HtmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlElement")
            .field("tag", &self.tag_name())
            .field("pos", &self.pos)
            .finish()
    }
}
