//! Request option and payload types for the domain client.

use serde::{Deserialize, Serialize};

/// Channel visibility, as encoded by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelType {
    /// Public channel, joinable by any team member.
    #[default]
    #[serde(rename = "O")]
    Open,
    /// Private channel, invitation only.
    #[serde(rename = "P")]
    Private,
}

impl ChannelType {
    /// The single-letter wire encoding (`O` or `P`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "O",
            Self::Private => "P",
        }
    }

    /// Parse the wire encoding, defaulting to open for unknown values.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        if code.eq_ignore_ascii_case("p") {
            Self::Private
        } else {
            Self::Open
        }
    }
}

/// Payload for creating a channel.
#[derive(Debug, Clone)]
pub struct NewChannel {
    /// Channel URL name (lowercase, no spaces).
    pub name: String,
    /// Channel display name.
    pub display_name: String,
    /// Channel purpose/description.
    pub purpose: String,
    /// Channel header text.
    pub header: String,
    /// Channel visibility.
    pub channel_type: ChannelType,
}

impl NewChannel {
    /// New open channel with empty purpose and header.
    #[must_use]
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            purpose: String::new(),
            header: String::new(),
            channel_type: ChannelType::Open,
        }
    }
}

/// Options for listing posts in a channel.
#[derive(Debug, Clone)]
pub struct PostListOptions {
    /// Page number for pagination.
    pub page: u64,
    /// Posts per page. Clamped to the platform cap of 200 at request time.
    pub per_page: u64,
    /// Only posts modified since this timestamp (milliseconds).
    pub since: Option<i64>,
    /// Only posts before this post ID.
    pub before: Option<String>,
    /// Only posts after this post ID.
    pub after: Option<String>,
}

impl Default for PostListOptions {
    fn default() -> Self {
        Self {
            page: 0,
            per_page: 60,
            since: None,
            before: None,
            after: None,
        }
    }
}

/// Options for searching posts.
///
/// The query term itself is passed through uninterpreted; quoting and OR
/// operators are the server's business.
#[derive(Debug, Clone, Copy)]
pub struct PostSearchOptions {
    /// True for OR search, false for AND search.
    pub is_or_search: bool,
    /// Timezone offset in seconds applied to date filters.
    pub time_zone_offset: i32,
    /// Include results from deleted channels.
    pub include_deleted_channels: bool,
    /// Page number.
    pub page: u64,
    /// Results per page.
    pub per_page: u64,
}

impl Default for PostSearchOptions {
    fn default() -> Self {
        Self {
            is_or_search: false,
            time_zone_offset: 0,
            include_deleted_channels: false,
            page: 0,
            per_page: 20,
        }
    }
}

/// Options for searching users.
#[derive(Debug, Clone)]
pub struct UserSearchOptions {
    /// Restrict the search to one team.
    pub team_id: Option<String>,
    /// Only users in this channel.
    pub in_channel_id: Option<String>,
    /// Only users NOT in this channel.
    pub not_in_channel_id: Option<String>,
    /// Maximum results.
    pub limit: u64,
}

impl Default for UserSearchOptions {
    fn default() -> Self {
        Self {
            team_id: None,
            in_channel_id: None,
            not_in_channel_id: None,
            limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_type_round_trips_wire_codes() {
        assert_eq!(ChannelType::Open.as_str(), "O");
        assert_eq!(ChannelType::Private.as_str(), "P");
        assert_eq!(ChannelType::from_code("P"), ChannelType::Private);
        assert_eq!(ChannelType::from_code("p"), ChannelType::Private);
        assert_eq!(ChannelType::from_code("O"), ChannelType::Open);
        assert_eq!(ChannelType::from_code("weird"), ChannelType::Open);
    }

    #[test]
    fn new_channel_defaults_to_open() {
        let channel = NewChannel::new("town-square", "Town Square");
        assert_eq!(channel.channel_type, ChannelType::Open);
        assert!(channel.purpose.is_empty());
        assert!(channel.header.is_empty());
    }
}
