use tracing::debug;

/// Narrow capability interface over whatever actually plays video.  Any
/// backend (browser media element bridge, native player, headless test
/// double) implements this; the engine never touches anything wider.
///
/// While a session is active the backend is the engine's exclusively owned
/// mutable resource.
pub trait MediaBackend {
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    /// Reset playback position to zero.
    fn rewind(&mut self);
    fn set_looping(&mut self, looping: bool);
    /// Release the attached source entirely.
    fn detach(&mut self);
}

/// Unsolicited events from the media backend, funnelled into the player's
/// event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSignal {
    /// Enough data buffered to start playback.
    Ready,
    /// Natural completion.
    Ended,
    Error(String),
}

/// Headless backend that only records intent in the log.  The production
/// default for this daemon; a display frontend substitutes its own.
#[derive(Debug, Default)]
pub struct LogBackend {
    current_url: Option<String>,
}

impl MediaBackend for LogBackend {
    fn load(&mut self, url: &str) {
        debug!("media: load {}", url);
        self.current_url = Some(url.to_string());
    }

    fn play(&mut self) {
        debug!("media: play");
    }

    fn pause(&mut self) {
        debug!("media: pause");
    }

    fn rewind(&mut self) {
        debug!("media: rewind to 0");
    }

    fn set_looping(&mut self, looping: bool) {
        debug!("media: loop={}", looping);
    }

    fn detach(&mut self) {
        debug!("media: detach");
        self.current_url = None;
    }
}

const VIDEO_EXTENSIONS: [&str; 6] = [".mp4", ".webm", ".avi", ".mov", ".mkv", ".m4v"];

const OBJECT_STORE_HOSTS: [&str; 3] = [
    ".blob.core.windows.net",
    ".amazonaws.com",
    ".googleapis.com",
];

/// A URL is playable when it is http(s) and either carries a known video
/// extension or points at a known object-storage host (those commonly serve
/// extension-less URLs with SAS-style query tokens).
pub fn is_valid_video_url(url: &str) -> bool {
    let parsed = match reqwest::Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if OBJECT_STORE_HOSTS.iter().any(|suffix| host.ends_with(suffix)) {
        return true;
    }
    let path = parsed.path().to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| path.contains(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_video_files() {
        assert!(is_valid_video_url("https://cdn.example.com/clips/intro.mp4"));
        assert!(is_valid_video_url("http://example.com/a/b/movie.WebM"));
    }

    #[test]
    fn accepts_object_storage_without_extension() {
        assert!(is_valid_video_url(
            "https://mystore.blob.core.windows.net/videos/clip?sv=2024&sig=abc"
        ));
        assert!(is_valid_video_url("https://bucket.s3.amazonaws.com/key"));
    }

    #[test]
    fn rejects_bad_schemes_and_garbage() {
        assert!(!is_valid_video_url("ftp://example.com/movie.mp4"));
        assert!(!is_valid_video_url("file:///tmp/movie.mp4"));
        assert!(!is_valid_video_url("not a url"));
        assert!(!is_valid_video_url("https://example.com/page.html"));
    }
}
