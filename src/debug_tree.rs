//! An owned, `ptree`-renderable copy of a parsed `ParseTreeSpan`, used only
//! by `Session::dump_tree` for inspecting a failed parse or a surprising
//! evaluation result: `write_self` prints one line per node, `children()`
//! hands back a `Cow` of the node's children.
//!
//! A fresh owned copy is built because the live `ParseTreeSpan` borrows a
//! `NameWard` to resolve a rule name to text, and that `NameWard` does not
//! outlive a single parse in `Session`.

use std::borrow::Cow;

use ptree::{Style, TreeItem};

use crate::parse_tree::ParseTreeSpan;
use crate::token::Tokenization;
use crate::ward::NameWard;

#[derive(Clone)]
pub struct DebugTree {
    label: String,
    children: Vec<DebugTree>,
}

impl DebugTree {
    pub fn build(tokenization: &Tokenization, ward: &NameWard, span: &ParseTreeSpan) -> Self {
        let (begin, length) = span.token_range();
        let text = if length > 0 { tokenization.text_at(begin) } else { "" };
        let label = format!(
            "{} # tokens {}..{} '{}'",
            ward.full_name(span.rule_name_id()),
            begin,
            begin + length,
            text
        );
        let children = span.children().map(|child| DebugTree::build(tokenization, ward, &child)).collect();
        DebugTree { label, children }
    }
}

impl TreeItem for DebugTree {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _style: &Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<[Self::Child]> {
        Cow::from(&self.children)
    }
}
