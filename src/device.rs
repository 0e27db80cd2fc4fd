//! Android TV key and app tables shared by the transports and the
//! navigation sequencer.

use serde::{Deserialize, Serialize};

/// A remote-control key, mapped to its Android keyevent code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Home,
    Back,
    Up,
    Down,
    Left,
    Right,
    Ok,
    Enter,
    Menu,
    Search,
    PlayPause,
    Stop,
    Next,
    Previous,
    Rewind,
    FastForward,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    Power,
    Sleep,
    Wakeup,
    /// PIN digit 0-9; keycodes 7-16.
    Digit(u8),
}

impl Key {
    pub const fn keycode(self) -> u32 {
        match self {
            Key::Home => 3,
            Key::Back => 4,
            Key::Up => 19,
            Key::Down => 20,
            Key::Left => 21,
            Key::Right => 22,
            Key::Ok => 23,
            Key::Enter => 66,
            Key::Menu => 82,
            Key::Search => 84,
            Key::PlayPause => 85,
            Key::Stop => 86,
            Key::Next => 87,
            Key::Previous => 88,
            Key::Rewind => 89,
            Key::FastForward => 90,
            Key::VolumeUp => 24,
            Key::VolumeDown => 25,
            Key::VolumeMute => 164,
            Key::Power => 26,
            Key::Sleep => 223,
            Key::Wakeup => 224,
            Key::Digit(d) => 7 + d as u32,
        }
    }

    /// Parse a key name as it appears in capability arguments. PIN digits are
    /// produced internally by the sequencer and have no argument spelling.
    pub fn parse(name: &str) -> Option<Key> {
        let key = match name {
            "home" => Key::Home,
            "back" => Key::Back,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "ok" => Key::Ok,
            "enter" => Key::Enter,
            "menu" => Key::Menu,
            "search" => Key::Search,
            _ => return None,
        };
        Some(key)
    }

    pub fn for_digit(digit: char) -> Option<Key> {
        digit.to_digit(10).map(|d| Key::Digit(d as u8))
    }

    pub fn for_direction(direction: &str) -> Option<Key> {
        match direction {
            "up" => Some(Key::Up),
            "down" => Some(Key::Down),
            "left" => Some(Key::Left),
            "right" => Some(Key::Right),
            _ => None,
        }
    }
}

/// An app the agent knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppId {
    YouTube,
    Netflix,
}

impl AppId {
    pub const fn package(self) -> &'static str {
        match self {
            AppId::YouTube => "com.google.android.youtube.tv",
            AppId::Netflix => "com.netflix.ninja",
        }
    }

    pub const fn activity(self) -> &'static str {
        match self {
            AppId::YouTube => "com.google.android.apps.youtube.tv.activity.ShellActivity",
            AppId::Netflix => "com.netflix.ninja.MainActivity",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            AppId::YouTube => "YouTube",
            AppId::Netflix => "Netflix",
        }
    }

    pub fn parse(name: &str) -> Option<AppId> {
        match name {
            "youtube" => Some(AppId::YouTube),
            "netflix" => Some(AppId::Netflix),
            _ => None,
        }
    }

    pub fn from_package(package: &str) -> Option<AppId> {
        match package {
            "com.google.android.youtube.tv" => Some(AppId::YouTube),
            "com.netflix.ninja" => Some(AppId::Netflix),
            _ => None,
        }
    }
}

/// Android TV launcher package, reported as the home screen by the
/// foreground-app query.
pub const LAUNCHER_PACKAGE: &str = "com.google.android.tvlauncher";

/// Deep-link URL for a named in-app page, if the app exposes one.
pub fn page_url(app: AppId, page: &str) -> Option<&'static str> {
    match (app, page) {
        (AppId::YouTube, "home") => Some("https://www.youtube.com"),
        (AppId::YouTube, "subscriptions") => Some("https://www.youtube.com/feed/subscriptions"),
        (AppId::YouTube, "library") => Some("https://www.youtube.com/feed/library"),
        (AppId::Netflix, "home") => Some("https://www.netflix.com/browse"),
        (AppId::Netflix, "my_list") => Some("https://www.netflix.com/browse/my-list"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycodes_match_android_keyevent_table() {
        assert_eq!(Key::Home.keycode(), 3);
        assert_eq!(Key::Ok.keycode(), 23);
        assert_eq!(Key::VolumeMute.keycode(), 164);
        assert_eq!(Key::Wakeup.keycode(), 224);
    }

    #[test]
    fn digit_keys_offset_from_seven() {
        assert_eq!(Key::for_digit('0'), Some(Key::Digit(0)));
        assert_eq!(Key::Digit(0).keycode(), 7);
        assert_eq!(Key::Digit(9).keycode(), 16);
        assert_eq!(Key::for_digit('x'), None);
    }

    #[test]
    fn key_parse_covers_remote_arguments() {
        assert_eq!(Key::parse("home"), Some(Key::Home));
        assert_eq!(Key::parse("ok"), Some(Key::Ok));
        assert_eq!(Key::parse("volume_up"), None);
    }

    #[test]
    fn app_round_trips_through_package() {
        for app in [AppId::YouTube, AppId::Netflix] {
            assert_eq!(AppId::from_package(app.package()), Some(app));
        }
        assert_eq!(AppId::from_package(LAUNCHER_PACKAGE), None);
    }

    #[test]
    fn page_urls_only_for_known_pages() {
        assert!(page_url(AppId::Netflix, "my_list").is_some());
        assert!(page_url(AppId::Netflix, "library").is_none());
    }
}
