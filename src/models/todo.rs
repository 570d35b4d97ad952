use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Todo {
    pub id: i64,
    pub list_id: i64,
    pub title: String,
    pub notes: String,
    pub priority: i64,
    pub due_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Todo {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoWithTags {
    #[serde(flatten)]
    pub todo: Todo,
    pub tags: Vec<String>,
}

impl TodoWithTags {
    pub fn has_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn priority_label(&self) -> &'static str {
        Priority::from_level(self.todo.priority).label()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn from_level(level: i64) -> Self {
        match level {
            1 => Self::Low,
            2 => Self::Medium,
            3 => Self::High,
            _ => Self::None,
        }
    }

    /// Parse a form value. Empty means no priority.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" | "0" => Some(Self::None),
            "1" => Some(Self::Low),
            "2" => Some(Self::Medium),
            "3" => Some(Self::High),
            _ => None,
        }
    }

    pub fn level(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTodo {
    pub title: String,
    pub notes: String,
    pub priority: Priority,
    /// UTC timestamp, already converted from the user's timezone.
    pub due_at: Option<String>,
    pub tags: Vec<String>,
}

/// Longest accepted todo title, in characters.
pub const MAX_TITLE: usize = 200;
