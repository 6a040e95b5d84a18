//! Task types and the per-adapter capability matrix.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Kind of generation a request asks for. Used for routing and capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Text,
    Image,
    Speech,
    Music,
}

impl TaskType {
    pub const ALL: [Self; 4] = [Self::Text, Self::Image, Self::Speech, Self::Music];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Speech => "speech",
            Self::Music => "music",
        }
    }
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "speech" | "tts" => Ok(Self::Speech),
            "music" => Ok(Self::Music),
            other => Err(ValidationError::InvalidTaskType {
                value: other.to_owned(),
            }),
        }
    }
}

/// Supported task matrix for a provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskSet {
    pub text: bool,
    pub image: bool,
    pub speech: bool,
    pub music: bool,
}

impl TaskSet {
    pub const fn new(text: bool, image: bool, speech: bool, music: bool) -> Self {
        Self {
            text,
            image,
            speech,
            music,
        }
    }

    pub const fn only(task: TaskType) -> Self {
        match task {
            TaskType::Text => Self::new(true, false, false, false),
            TaskType::Image => Self::new(false, true, false, false),
            TaskType::Speech => Self::new(false, false, true, false),
            TaskType::Music => Self::new(false, false, false, true),
        }
    }

    pub fn from_tasks(tasks: &[TaskType]) -> Self {
        tasks
            .iter()
            .fold(Self::default(), |set, task| set.union(Self::only(*task)))
    }

    pub const fn supports(self, task: TaskType) -> bool {
        match task {
            TaskType::Text => self.text,
            TaskType::Image => self.image,
            TaskType::Speech => self.speech,
            TaskType::Music => self.music,
        }
    }

    pub const fn union(self, other: Self) -> Self {
        Self::new(
            self.text || other.text,
            self.image || other.image,
            self.speech || other.speech,
            self.music || other.music,
        )
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self::new(
            self.text && other.text,
            self.image && other.image,
            self.speech && other.speech,
            self.music && other.music,
        )
    }

    pub const fn is_empty(self) -> bool {
        !(self.text || self.image || self.speech || self.music)
    }

    pub fn supported_tasks(self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|task| self.supports(*task))
            .collect()
    }
}
