use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Broadcast program categories.  The remote source sends free-form strings;
/// anything we don't recognise renders with news styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramType {
    Weather,
    Sports,
    News,
    Traffic,
    Culture,
}

impl ProgramType {
    /// All types in the order the fallback schedule cycles through them.
    pub const ALL: [ProgramType; 5] = [
        ProgramType::Weather,
        ProgramType::Sports,
        ProgramType::News,
        ProgramType::Traffic,
        ProgramType::Culture,
    ];

    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "weather" => ProgramType::Weather,
            "sports" => ProgramType::Sports,
            "traffic" => ProgramType::Traffic,
            "culture" => ProgramType::Culture,
            _ => ProgramType::News,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgramType::Weather => "Weather",
            ProgramType::Sports => "Sports",
            ProgramType::News => "News",
            ProgramType::Traffic => "Traffic",
            ProgramType::Culture => "Culture",
        }
    }

    /// Placeholder card rendered when a program has no playable video.
    pub fn placeholder(&self) -> PlaceholderCard {
        match self {
            ProgramType::Weather => PlaceholderCard {
                icon: "🌤️",
                gradient: ("#4FC3F7", "#29B6F6"),
                title: "Weather forecast",
                subtitle: "Updated forecast from the meteorological service",
            },
            ProgramType::Sports => PlaceholderCard {
                icon: "⚽",
                gradient: ("#66BB6A", "#4CAF50"),
                title: "Sports results",
                subtitle: "Latest from national and international sports",
            },
            ProgramType::News => PlaceholderCard {
                icon: "📰",
                gradient: ("#FF7043", "#FF5722"),
                title: "Latest news",
                subtitle: "Important news updates from home and abroad",
            },
            ProgramType::Traffic => PlaceholderCard {
                icon: "🚗",
                gradient: ("#FFA726", "#FF9800"),
                title: "Traffic info",
                subtitle: "The traffic situation right now",
            },
            ProgramType::Culture => PlaceholderCard {
                icon: "🎭",
                gradient: ("#AB47BC", "#9C27B0"),
                title: "Culture and entertainment",
                subtitle: "From the arts, culture and entertainment scene",
            },
        }
    }
}

impl<'de> Deserialize<'de> for ProgramType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ProgramType::parse_lossy(&s))
    }
}

/// Generated substitute shown when no video is available or playable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceholderCard {
    pub icon: &'static str,
    /// Two gradient stops, light to dark.
    pub gradient: (&'static str, &'static str),
    pub title: &'static str,
    pub subtitle: &'static str,
}

/// One scheduled broadcast slot as returned by the schedule endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(rename = "broadcastscheduleid")]
    pub id: String,
    pub name: String,
    #[serde(rename = "programtype", default = "default_program_type")]
    pub program_type: ProgramType,
    #[serde(rename = "scheduledtime")]
    pub scheduled_time: DateTime<Utc>,
    /// Whole seconds.  `None` means play until the media signals natural
    /// completion.  Zero is normalised to `None` at schedule build time.
    #[serde(rename = "duration", default)]
    pub duration_secs: Option<u32>,
    #[serde(rename = "videourl", default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Only used for tie-breaking in news ordering, never program ordering.
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "isactive", default)]
    pub is_active: bool,
}

fn default_program_type() -> ProgramType {
    ProgramType::News
}

impl Program {
    /// Duration as a chrono span, if this program runs on a fixed timer.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(|s| Duration::seconds(i64::from(s)))
    }
}

/// An ordered run of active programs, ascending by scheduled time.
/// Immutable between refreshes — a refresh replaces it wholesale.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    programs: Vec<Program>,
}

impl Schedule {
    /// Builds a schedule from raw records: drops inactive entries,
    /// normalises zero durations to `None`, sorts by scheduled time.
    pub fn new(mut programs: Vec<Program>) -> Self {
        programs.retain(|p| p.is_active);
        for p in &mut programs {
            if p.duration_secs == Some(0) {
                p.duration_secs = None;
            }
        }
        programs.sort_by_key(|p| p.scheduled_time);
        Self { programs }
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn get(&self, idx: usize) -> Option<&Program> {
        self.programs.get(idx)
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// The earliest entry strictly in the future, with its index.
    pub fn next_upcoming(&self, now: DateTime<Utc>) -> Option<(usize, &Program)> {
        self.programs
            .iter()
            .enumerate()
            .find(|(_, p)| p.scheduled_time > now)
    }

    /// Up to `limit` upcoming entries for the status display.
    pub fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<&Program> {
        self.programs
            .iter()
            .filter(|p| p.scheduled_time > now)
            .take(limit)
            .collect()
    }
}

/// Seconds remaining until `target`, rounded up, floored at zero.
pub fn countdown_secs(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (target - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms + 999) / 1000
    }
}
