use std::collections::{HashMap, HashSet};
use xxhash_rust::xxh64::xxh64;

use crate::model::SelectTable;

/// Substitutions for table aliases longer than the identifier limit.
#[derive(Debug, Default, Clone)]
pub struct AliasMap {
    renamed: HashMap<String, String>,
}

impl AliasMap {
    /// Shorten every alias over `max_len` characters. Replacement aliases
    /// never collide with each other or with aliases kept as they are.
    pub fn build(tables: &[SelectTable], max_len: usize) -> Self {
        let mut used: HashSet<String> = tables
            .iter()
            .filter(|t| t.alias.chars().count() <= max_len)
            .map(|t| t.alias.to_lowercase())
            .collect();

        let mut renamed = HashMap::new();
        for (index, table) in tables.iter().enumerate() {
            if table.alias.chars().count() <= max_len {
                continue;
            }
            let mut seed = 0;
            let short = loop {
                let candidate = shortened_alias(&table.alias, index, max_len, seed);
                if used.insert(candidate.to_lowercase()) {
                    break candidate;
                }
                seed += 1;
            };
            tracing::debug!(alias = %table.alias, %short, "shortened table alias");
            renamed.insert(table.alias.clone(), short);
        }
        Self { renamed }
    }

    /// Alias to emit for `alias`.
    pub fn get<'a>(&'a self, alias: &'a str) -> &'a str {
        self.renamed.get(alias).map(String::as_str).unwrap_or(alias)
    }

    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty()
    }
}

/// `auto_<hash>_<index>`, with the hash cut so the result fits `max_len`.
pub fn shortened_alias(alias: &str, index: usize, max_len: usize, seed: u64) -> String {
    let hash = format!("{:016x}", xxh64(alias.as_bytes(), seed));
    let suffix = format!("_{}", index);
    let fixed = "auto_".len() + suffix.len();
    let hash_len = max_len.saturating_sub(fixed).clamp(1, hash.len());
    format!("auto_{}{}", &hash[..hash_len], suffix)
}
