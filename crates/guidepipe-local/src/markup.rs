//! Owned, typed markup tree.
//!
//! Pages are parsed once with `scraper` (html5ever) and copied into a flat arena of
//! [`Node`]s. Slots are stored in document (pre-)order, so "document order" is simply
//! ascending [`NodeId`], and a subtree is a contiguous id range.

use std::collections::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(tag: &str, attrs: &[(&str, &str)]) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|s| !s.is_empty())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|x| x.eq_ignore_ascii_case(class)))
    }

    /// `Some(1..=6)` for `h1`..`h6`.
    pub fn heading_level(&self) -> Option<u8> {
        let rest = self.tag.strip_prefix('h')?;
        match rest.parse::<u8>() {
            Ok(n @ 1..=6) => Some(n),
            _ => None,
        }
    }

    pub fn is_heading(&self) -> bool {
        self.heading_level().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Root,
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let parsed = html_scraper::Html::parse_document(html);
        let mut slots: Vec<Slot> = Vec::new();
        let mut ids = HashMap::new();

        // `descendants()` is pre-order, so parents are always mapped before their children.
        for n in parsed.tree.root().descendants() {
            let node = match n.value() {
                html_scraper::Node::Document | html_scraper::Node::Fragment => {
                    if !slots.is_empty() {
                        continue;
                    }
                    Node::Root
                }
                html_scraper::Node::Text(t) => {
                    let s: &str = t;
                    Node::Text(s.to_string())
                }
                html_scraper::Node::Element(e) => Node::Element(Element {
                    tag: e.name().to_ascii_lowercase(),
                    attrs: e
                        .attrs()
                        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                        .collect(),
                }),
                _ => continue,
            };
            let parent = n.parent().and_then(|p| ids.get(&p.id()).copied());
            if slots.is_empty() {
                ids.insert(n.id(), 0);
                slots.push(Slot {
                    node: Node::Root,
                    parent: None,
                    children: Vec::new(),
                });
                continue;
            }
            // Nodes under a skipped parent (e.g. template contents) are dropped.
            let Some(parent) = parent else { continue };
            let id = slots.len();
            ids.insert(n.id(), id);
            slots.push(Slot {
                node,
                parent: Some(parent),
                children: Vec::new(),
            });
            slots[parent].children.push(id);
        }

        if slots.is_empty() {
            slots.push(Slot {
                node: Node::Root,
                parent: None,
                children: Vec::new(),
            });
        }
        Self { slots }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.slots[id].node
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.slots.get(id).map(|s| &s.node) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id)
            .map(|s| s.children.as_slice())
            .unwrap_or(&[])
    }

    /// Next sibling that is an element (text between siblings is skipped).
    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.children(parent)
            .iter()
            .skip_while(|&&c| c != id)
            .skip(1)
            .copied()
            .find(|&c| self.element(c).is_some())
    }

    /// One past the last id inside `id`'s subtree.
    fn subtree_end(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(&last) = self.children(cur).last() {
            cur = last;
        }
        cur + 1
    }

    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        ancestor < id && id < self.subtree_end(ancestor)
    }

    /// All nodes strictly inside `id`, in document order.
    pub fn descendants(&self, id: NodeId) -> std::ops::Range<NodeId> {
        (id + 1)..self.subtree_end(id)
    }

    /// Elements inside `scope` (exclusive) in document order.
    pub fn elements_within(&self, scope: NodeId) -> impl Iterator<Item = (NodeId, &Element)> {
        self.descendants(scope)
            .filter_map(move |i| self.element(i).map(|e| (i, e)))
    }

    /// Every element of the document in document order.
    pub fn elements(&self) -> impl Iterator<Item = (NodeId, &Element)> {
        self.elements_within(self.root())
    }

    /// Nearest element (including `id` itself) matching `pred`, walking up.
    pub fn closest(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if let Some(e) = self.element(c) {
                if pred(e) {
                    return Some(c);
                }
            }
            cur = self.parent(c);
        }
        None
    }

    /// Concatenated text of the subtree, untrimmed.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Node::Text(t) = self.node(id) {
            out.push_str(t);
        }
        for i in self.descendants(id) {
            if let Node::Text(t) = self.node(i) {
                out.push_str(t);
            }
        }
        out
    }

    pub fn find_by_id(&self, wanted: &str) -> Option<NodeId> {
        self.elements()
            .find(|(_, e)| e.attr("id") == Some(wanted))
            .map(|(i, _)| i)
    }

    pub fn first_tag_within(&self, scope: NodeId, tag: &str) -> Option<NodeId> {
        self.elements_within(scope)
            .find(|(_, e)| e.tag == tag)
            .map(|(i, _)| i)
    }

    pub fn first_with_class(&self, class: &str) -> Option<NodeId> {
        self.elements()
            .find(|(_, e)| e.has_class(class))
            .map(|(i, _)| i)
    }

    /// `<title>` text, trimmed.
    pub fn title_tag(&self) -> Option<String> {
        let id = self.first_tag_within(self.root(), "title")?;
        let t = self.text(id).trim().to_string();
        (!t.is_empty()).then_some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_into_document_order() {
        let doc = Document::parse("<html><body><h1 id=a>A</h1><p>one <b>two</b></p></body></html>");
        let tags: Vec<&str> = doc.elements().map(|(_, e)| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["html", "head", "body", "h1", "p", "b"]);
        let h1 = doc.find_by_id("a").unwrap();
        assert_eq!(doc.text(h1), "A");
        let p = doc.next_element_sibling(h1).unwrap();
        assert_eq!(doc.element(p).unwrap().tag, "p");
        assert_eq!(doc.text(p), "one two");
    }

    #[test]
    fn next_element_sibling_skips_text() {
        let doc = Document::parse("<div><span id=x>x</span> text <em>y</em></div>");
        let x = doc.find_by_id("x").unwrap();
        let y = doc.next_element_sibling(x).unwrap();
        assert_eq!(doc.element(y).unwrap().tag, "em");
        assert!(doc.next_element_sibling(y).is_none());
    }

    #[test]
    fn descendant_and_closest_queries() {
        let doc = Document::parse(
            r#"<div class="outer main"><section><p id=p>hi</p></section></div><p id=q>out</p>"#,
        );
        let outer = doc.first_with_class("main").unwrap();
        let p = doc.find_by_id("p").unwrap();
        let q = doc.find_by_id("q").unwrap();
        assert!(doc.is_descendant_of(p, outer));
        assert!(!doc.is_descendant_of(q, outer));
        assert!(!doc.is_descendant_of(outer, outer));
        assert_eq!(doc.closest(p, |e| e.has_class("outer")), Some(outer));
        assert_eq!(doc.closest(p, |e| e.tag == "p"), Some(p));
        assert_eq!(doc.closest(q, |e| e.has_class("outer")), None);
    }

    #[test]
    fn element_helpers() {
        let h = Element::new("H3", &[("ID", "x"), ("class", "a  Breadcrumb-Item")]);
        assert_eq!(h.heading_level(), Some(3));
        assert_eq!(h.id(), Some("x"));
        assert!(h.has_class("breadcrumb-item"));
        assert!(!h.has_class("breadcrumb"));
        assert_eq!(Element::new("hr", &[]).heading_level(), None);
        assert_eq!(Element::new("h7", &[]).heading_level(), None);
        assert_eq!(Element::new("header", &[]).heading_level(), None);
    }

    #[test]
    fn title_tag_is_read() {
        let doc = Document::parse("<html><head><title> Crops </title></head><body></body></html>");
        assert_eq!(doc.title_tag().as_deref(), Some("Crops"));
    }
}
