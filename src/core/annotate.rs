//! Maintainer annotation
//!
//! Line filter behind `pkgcycle-annotate`: when a line's first
//! identifier-shaped token names a managed package, the maintainers' handles
//! are appended to the line.

use std::collections::BTreeMap;

use regex::Regex;

use crate::core::recipe::Recipe;

/// Maximal run of characters allowed in a package identifier
const TOKEN_PATTERN: &str = r"[A-Za-z0-9._+-]+";

/// Appends maintainer handles to lines mentioning known packages
#[derive(Debug)]
pub struct Annotator {
    token: Regex,
    handles: BTreeMap<String, Vec<String>>,
}

impl Annotator {
    /// Build an annotator from the loaded recipes.
    pub fn new(recipes: &BTreeMap<String, Recipe>) -> Self {
        let handles = recipes
            .iter()
            .map(|(pkgbase, recipe)| {
                let handles = recipe
                    .maintainers
                    .iter()
                    .map(|m| m.handle.clone())
                    .collect();
                (pkgbase.clone(), handles)
            })
            .collect();

        Self {
            token: Regex::new(TOKEN_PATTERN).expect("valid token pattern"),
            handles,
        }
    }

    /// Annotate one line; lines without a known package pass through.
    pub fn annotate_line(&self, line: &str) -> String {
        let Some(token) = self.token.find(line) else {
            return line.to_string();
        };
        let Some(handles) = self.handles.get(token.as_str()) else {
            return line.to_string();
        };

        let mentions: Vec<String> = handles.iter().map(|h| format!("@{h}")).collect();
        format!("{line}  ({})", mentions.join(" "))
    }
}
