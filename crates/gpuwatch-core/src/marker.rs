//! Per-user display markers.
//!
//! Purely cosmetic: markers are appended to usernames in status lines
//! and never take part in occupancy detection or diffing.

/// Marker for users without an entry in [`USER_MARKERS`].
pub const DEFAULT_MARKER: &str = "💸";

/// Known users and their markers.
const USER_MARKERS: &[(&str, &str)] = &[
    ("chunqiu2", "🐍"),
    ("ywei40", "💩"),
    ("yifeng6", "🐝"),
    ("shizhuo2", "🎡"),
    ("yinlind2", "🌲"),
    ("cy54", "🎣"),
];

/// Returns the marker for `username`, falling back to [`DEFAULT_MARKER`].
pub fn user_marker(username: &str) -> &'static str {
    USER_MARKERS
        .iter()
        .find(|(name, _)| *name == username)
        .map(|(_, marker)| *marker)
        .unwrap_or(DEFAULT_MARKER)
}

/// Returns `username` followed by its marker.
pub fn decorate_user(username: &str) -> String {
    format!("{username}{}", user_marker(username))
}
