use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagUsage {
    pub name: String,
    pub count: i64,
}

/// Split a comma separated tag field into lower-cased, trimmed, unique names,
/// keeping first-seen order.
pub fn normalize_tags(input: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for raw in input.split(',') {
        let name = raw.trim().to_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
