//! Transcript labels: `"<folder> #<n>"`, numbered per folder within one scan.

use std::collections::HashMap;

/// Label used for items directly under the source root
const ROOT_LABEL: &str = "root";

/// Per-folder ordinals for one scan.
///
/// A fresh counter is created for every scan and passed down explicitly, so
/// concurrent scans never share numbering.
#[derive(Debug, Default)]
pub struct LabelCounter {
    counts: HashMap<String, u32>,
}

impl LabelCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next label for an item in the same folder as `source_id`
    pub fn next_label(&mut self, source_id: &str) -> String {
        let folder = folder_name(source_id);
        let n = self.counts.entry(folder.to_string()).or_insert(0);
        *n += 1;
        format!("{} #{}", folder, n)
    }
}

/// Name of the folder containing `source_id`
pub fn folder_name(source_id: &str) -> &str {
    let parent = match source_id.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) => parent,
        None => return ROOT_LABEL,
    };

    let name = parent.rsplit('/').next().unwrap_or(parent);
    // "disk:" and similar scheme roots
    let name = name.trim_end_matches(':');
    if name.is_empty() {
        ROOT_LABEL
    } else {
        name
    }
}
