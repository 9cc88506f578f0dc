use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Raw news record as returned by the news endpoint.  Rendering into the
/// ticker string happens once at load time; the ticker itself only ever
/// holds strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsRecord {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "publishdate", default)]
    pub publish_date: Option<DateTime<Utc>>,
}

impl NewsRecord {
    /// Display string: `<glyph> <headline> • <age> (<source>)`, where every
    /// annotation is optional.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut text = self
            .headline
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("News update")
            .to_string();

        if let Some(glyph) = self.category.as_deref().and_then(category_glyph) {
            text = format!("{glyph} {text}");
        }
        if let Some(published) = self.publish_date {
            text.push_str(" • ");
            text.push_str(&relative_age(published, now));
        }
        if let Some(source) = self.source.as_deref().filter(|s| !s.is_empty()) {
            text.push_str(&format!(" ({source})"));
        }
        text
    }
}

pub fn category_glyph(category: &str) -> Option<&'static str> {
    match category {
        "Breaking" => Some("🚨"),
        "Sports" => Some("⚽"),
        "Weather" => Some("🌤️"),
        "Culture" => Some("🎭"),
        "Politics" => Some("🏛️"),
        "Business" => Some("💼"),
        "Technology" => Some("💻"),
        _ => None,
    }
}

/// Coarse age annotation: below an hour "just now", then whole hours, then
/// whole days.  Future timestamps read as "just now".
pub fn relative_age(published: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (now - published).num_hours();
    if hours < 1 {
        "just now".to_string()
    } else if hours < 24 {
        format!("{hours}h ago")
    } else {
        format!("{}d ago", hours / 24)
    }
}

/// Static ticker content used when the remote news source is missing or
/// unreachable.
pub fn fallback_news() -> Vec<String> {
    [
        "📺 Signage broadcast player running • just now",
        "🔄 Automatic program scheduling from the remote schedule source • 1h ago",
        "📊 Real-time updates and automatic failover • 2h ago",
        "🔒 Authenticated access to schedule and news data • 3h ago",
        "🎥 Video playback with animated placeholder fallback • 5h ago",
        "⏱️ Per-second countdown to the next scheduled program • 1d ago",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
