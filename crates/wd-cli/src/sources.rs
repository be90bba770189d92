use std::fs;
use std::path::Path;

use wd_compiler::lists::now_millis;
use wd_compiler::{CachedList, FilterList, ListFormat};
use wd_core::Category;

/// A list named on the command line as `[category=]location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSource {
    pub category: Category,
    pub location: String,
}

impl ListSource {
    /// Lists without a category prefix are treated as plain subscriptions.
    pub fn parse(spec: &str) -> Result<Self, String> {
        match spec.split_once('=') {
            Some((category, location)) if !category.contains('/') && !category.contains(':') => Ok(Self {
                category: category.parse().map_err(|e| format!("'{}': {}", spec, e))?,
                location: location.to_string(),
            }),
            _ => Ok(Self {
                category: Category::FilterLists,
                location: spec.to_string(),
            }),
        }
    }

    pub fn meta(&self, format: Option<ListFormat>, text: &str) -> FilterList {
        let name = self
            .location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.location);
        let mut meta = FilterList::new(self.location.clone(), self.location.clone(), self.category);
        meta.display_name = name.to_string();
        meta.format = format.unwrap_or_else(|| ListFormat::detect(text));
        meta
    }
}

pub fn load_local_lists(specs: &[String], format: Option<ListFormat>, verbose: bool) -> Result<Vec<CachedList>, String> {
    if specs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let mut lists = Vec::with_capacity(specs.len());
    for (index, spec) in specs.iter().enumerate() {
        let source = ListSource::parse(spec)?;
        let content = fs::read_to_string(&source.location)
            .map_err(|e| format!("Failed to read '{}': {}", source.location, e))?;

        let cached = CachedList::from_text(source.meta(format, &content), &content, now_millis());

        if verbose {
            println!(
                "  [{}] {} ({}, {:?}) - {} lines, {} rules, {} skipped",
                index,
                Path::new(&source.location)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy(),
                cached.meta.category,
                cached.meta.format,
                cached.meta.raw_rule_count,
                cached.rules.len(),
                cached.skipped
            );
        }

        lists.push(cached);
    }

    Ok(lists)
}
