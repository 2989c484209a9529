//! A collection of newtypes defining type-strong IDs.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::json_safe_u64;

macro_rules! id_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(
            Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
            Serialize,
        )]
        pub struct $name(#[serde(with = "json_safe_u64")] pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type!(
    /// ID of a voice channel.
    ChannelId
);
id_type!(
    /// ID of the guild (server) owning a voice channel.
    GuildId
);
id_type!(
    /// ID of a user, such as the bot account connecting to voice.
    UserId
);
