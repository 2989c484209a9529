use enum_primitive::*;

enum_from_primitive! {
/// Close codes sent by a voice gateway when it terminates the control connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CloseCode {
    /// Invalid voice opcode.
    UnknownOpcode = 4001,

    /// Invalid payload sent.
    DecodeFailure = 4002,

    /// A payload was sent prior to identifying.
    NotAuthenticated = 4003,

    /// The token sent with the identify payload was incorrect.
    AuthenticationFailed = 4004,

    /// More than one identify payload was sent.
    AlreadyAuthenticated = 4005,

    /// The session is no longer valid.
    SessionInvalid = 4006,

    /// A session timed out.
    SessionTimeout = 4009,

    /// The server for the last connection attempt could not be found.
    ServerNotFound = 4011,

    /// The server did not recognise the voice protocol chosen.
    UnknownProtocol = 4012,

    /// Disconnected, either due to channel closure/removal or kicking.
    ///
    /// Should not reconnect.
    Disconnected = 4014,

    /// Connected voice server crashed.
    VoiceServerCrash = 4015,

    /// The server didn't recognise the encryption scheme.
    UnknownEncryptionMode = 4016,
}
}

impl CloseCode {
    /// Parses a raw websocket close code, if it is one the voice gateway defines.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::from_u16(code)
    }

    /// Indicates whether a voice client should try to establish a fresh session in response
    /// to this close code.
    ///
    /// Otherwise, the connection is over for good.
    pub fn should_reconnect(self) -> bool {
        !matches!(
            self,
            Self::AuthenticationFailed | Self::Disconnected | Self::UnknownEncryptionMode
        )
    }
}
