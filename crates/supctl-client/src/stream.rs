//! Path-keyed streaming document processor.
//!
//! Some daemon replies are not a flat field-to-field mapping: `reloadConfig`
//! returns three logically distinct group lists serialized as one unlabeled
//! array-of-arrays, where only position conveys meaning. This processor lets
//! a caller reconstruct that grouping from structural cues alone: it drives a
//! single linear pass over the document, maintains a path stack, and fires
//! registered callbacks whose slash-delimited path exactly matches the
//! current position. No document tree is built.
//!
//! Two callback kinds exist per path:
//! - a *leaf* callback, fired with the decoded text of a terminal element;
//! - a *container* callback, fired as a value-less pulse when an element at
//!   the path is entered or exited, used purely as a positional signal.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::Reader;

use crate::xmlrpc::{next_node, XmlNode, XmlRpcError};

type LeafFn<'a> = Box<dyn FnMut(&str) + 'a>;
type PulseFn<'a> = Box<dyn FnMut() + 'a>;

/// Registration table for one streaming pass.
///
/// Built fresh per response and discarded afterwards; nothing persists
/// across calls.
#[derive(Default)]
pub struct PathProcessor<'a> {
    leaf: HashMap<String, LeafFn<'a>>,
    container: HashMap<String, PulseFn<'a>>,
}

struct Frame {
    name: String,
    text: String,
    has_children: bool,
}

impl<'a> PathProcessor<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for the decoded text of every terminal element
    /// whose full path from the root equals `path`.
    pub fn on_leaf(&mut self, path: impl Into<String>, callback: impl FnMut(&str) + 'a) {
        self.leaf.insert(path.into(), Box::new(callback));
    }

    /// Register a pulse fired once each time an element at `path` is
    /// entered or exited.
    pub fn on_container(&mut self, path: impl Into<String>, callback: impl FnMut() + 'a) {
        self.container.insert(path.into(), Box::new(callback));
    }

    /// Drive a single pass over `input`, firing callbacks synchronously in
    /// document order.
    ///
    /// Malformed or truncated input is a decode failure; callers are
    /// expected to discard anything accumulated so far.
    pub fn process<R: BufRead>(&mut self, input: R) -> Result<(), XmlRpcError> {
        let mut reader = Reader::from_reader(input);
        let mut buf = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut seen_root = false;

        loop {
            match next_node(&mut reader, &mut buf)? {
                XmlNode::Open(name) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_children = true;
                    }
                    stack.push(Frame {
                        name,
                        text: String::new(),
                        has_children: false,
                    });
                    seen_root = true;
                    self.pulse(&path_of(&stack));
                }
                XmlNode::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t);
                    }
                }
                XmlNode::Empty(name) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_children = true;
                    }
                    stack.push(Frame {
                        name,
                        text: String::new(),
                        has_children: false,
                    });
                    seen_root = true;
                    let path = path_of(&stack);
                    self.pulse(&path);
                    self.leaf_hit(&path, "");
                    self.pulse(&path);
                    stack.pop();
                }
                XmlNode::Close(name) => {
                    let Some(frame) = stack.last() else {
                        return Err(XmlRpcError::Shape(format!("stray closing </{name}>")));
                    };
                    if frame.name != name {
                        return Err(XmlRpcError::Shape(format!(
                            "mismatched </{name}>, expected </{}>",
                            frame.name
                        )));
                    }
                    let path = path_of(&stack);
                    if !frame.has_children {
                        let text = frame.text.trim().to_string();
                        self.leaf_hit(&path, &text);
                    }
                    self.pulse(&path);
                    stack.pop();
                }
                XmlNode::Eof => {
                    if !stack.is_empty() {
                        return Err(XmlRpcError::Truncated("document ended inside an element"));
                    }
                    if !seen_root {
                        return Err(XmlRpcError::Truncated("empty document"));
                    }
                    return Ok(());
                }
                XmlNode::Other => {}
            }
        }
    }

    fn pulse(&mut self, path: &str) {
        if let Some(callback) = self.container.get_mut(path) {
            callback();
        }
    }

    fn leaf_hit(&mut self, path: &str, text: &str) {
        if let Some(callback) = self.leaf.get_mut(path) {
            callback(text);
        }
    }
}

fn path_of(stack: &[Frame]) -> String {
    let mut path = String::new();
    for frame in stack {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(&frame.name);
    }
    path
}
