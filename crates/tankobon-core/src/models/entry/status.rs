use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    Unknown,
    Reading,
    PlanToRead,
    Completed,
    Dropped,
    OnHold,
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Reading => write!(f, "reading"),
            Self::PlanToRead => write!(f, "plan_to_read"),
            Self::Completed => write!(f, "completed"),
            Self::Dropped => write!(f, "dropped"),
            Self::OnHold => write!(f, "on_hold"),
        }
    }
}

impl std::str::FromStr for ReadingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "reading" => Ok(Self::Reading),
            "plan_to_read" => Ok(Self::PlanToRead),
            "completed" => Ok(Self::Completed),
            "dropped" => Ok(Self::Dropped),
            "on_hold" => Ok(Self::OnHold),
            _ => Err(format!("Invalid ReadingStatus: {s}")),
        }
    }
}
