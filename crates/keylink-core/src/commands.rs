//! Wire-level command identifiers, status bytes, and device error codes.
//!
//! These values are fixed by the lock's protocol. Commands are u16
//! little-endian on the wire; statuses and error codes are single bytes.

/// A protocol command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    Empty = 0x0000,
    RequestData = 0x0001,
    PublicKey = 0x0003,
    Challenge = 0x0004,
    AuthorizationAuthenticator = 0x0005,
    AuthorizationData = 0x0006,
    AuthorizationId = 0x0007,
    RemoveAuthorizationEntry = 0x0008,
    RequestAuthorizationEntries = 0x0009,
    AuthorizationEntry = 0x000A,
    AuthorizationDataInvite = 0x000B,
    KeyturnerStates = 0x000C,
    LockAction = 0x000D,
    Status = 0x000E,
    MostRecentCommand = 0x000F,
    OpeningsClosingsSummary = 0x0010,
    BatteryReport = 0x0011,
    ErrorReport = 0x0012,
    SetConfig = 0x0013,
    RequestConfig = 0x0014,
    Config = 0x0015,
    SetSecurityPin = 0x0019,
    RequestCalibration = 0x001A,
    RequestReboot = 0x001D,
    AuthorizationIdConfirmation = 0x001E,
    AuthorizationIdInvite = 0x001F,
    VerifySecurityPin = 0x0020,
    UpdateTime = 0x0021,
    UpdateAuthorizationEntry = 0x0025,
    AuthorizationEntryCount = 0x0027,
    RequestLogEntries = 0x0031,
    LogEntry = 0x0032,
    LogEntryCount = 0x0033,
    EnableLogging = 0x0034,
    SetAdvancedConfig = 0x0035,
    RequestAdvancedConfig = 0x0036,
    AdvancedConfig = 0x0037,
    AddTimeControlEntry = 0x0039,
    TimeControlEntryId = 0x003A,
    RemoveTimeControlEntry = 0x003B,
    RequestTimeControlEntries = 0x003C,
    TimeControlEntryCount = 0x003D,
    TimeControlEntry = 0x003E,
    UpdateTimeControlEntry = 0x003F,
    AddKeypadCode = 0x0041,
    KeypadCodeId = 0x0042,
    RequestKeypadCodes = 0x0043,
    KeypadCodeCount = 0x0044,
    KeypadCode = 0x0045,
    UpdateKeypadCode = 0x0046,
    RemoveKeypadCode = 0x0047,
    KeypadAction = 0x0048,
    SimpleLockAction = 0x0100,
}

impl Command {
    /// The wire code for this command.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Parse a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        use Command::*;
        Some(match code {
            0x0000 => Empty,
            0x0001 => RequestData,
            0x0003 => PublicKey,
            0x0004 => Challenge,
            0x0005 => AuthorizationAuthenticator,
            0x0006 => AuthorizationData,
            0x0007 => AuthorizationId,
            0x0008 => RemoveAuthorizationEntry,
            0x0009 => RequestAuthorizationEntries,
            0x000A => AuthorizationEntry,
            0x000B => AuthorizationDataInvite,
            0x000C => KeyturnerStates,
            0x000D => LockAction,
            0x000E => Status,
            0x000F => MostRecentCommand,
            0x0010 => OpeningsClosingsSummary,
            0x0011 => BatteryReport,
            0x0012 => ErrorReport,
            0x0013 => SetConfig,
            0x0014 => RequestConfig,
            0x0015 => Config,
            0x0019 => SetSecurityPin,
            0x001A => RequestCalibration,
            0x001D => RequestReboot,
            0x001E => AuthorizationIdConfirmation,
            0x001F => AuthorizationIdInvite,
            0x0020 => VerifySecurityPin,
            0x0021 => UpdateTime,
            0x0025 => UpdateAuthorizationEntry,
            0x0027 => AuthorizationEntryCount,
            0x0031 => RequestLogEntries,
            0x0032 => LogEntry,
            0x0033 => LogEntryCount,
            0x0034 => EnableLogging,
            0x0035 => SetAdvancedConfig,
            0x0036 => RequestAdvancedConfig,
            0x0037 => AdvancedConfig,
            0x0039 => AddTimeControlEntry,
            0x003A => TimeControlEntryId,
            0x003B => RemoveTimeControlEntry,
            0x003C => RequestTimeControlEntries,
            0x003D => TimeControlEntryCount,
            0x003E => TimeControlEntry,
            0x003F => UpdateTimeControlEntry,
            0x0041 => AddKeypadCode,
            0x0042 => KeypadCodeId,
            0x0043 => RequestKeypadCodes,
            0x0044 => KeypadCodeCount,
            0x0045 => KeypadCode,
            0x0046 => UpdateKeypadCode,
            0x0047 => RemoveKeypadCode,
            0x0048 => KeypadAction,
            0x0100 => SimpleLockAction,
            _ => return None,
        })
    }
}

/// Terminal status byte carried by `Command::Status` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandStatus {
    /// The command finished.
    Complete = 0x00,
    /// The command was accepted and is executing; Complete follows.
    Accepted = 0x01,
}

impl CommandStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(CommandStatus::Complete),
            0x01 => Some(CommandStatus::Accepted),
            _ => None,
        }
    }
}

/// Error codes the lock reports in `Command::ErrorReport` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceError {
    // General
    BadCrc = 0xFD,
    BadLength = 0xFE,
    Unknown = 0xFF,
    // Pairing service
    NotPairing = 0x10,
    BadAuthenticator = 0x11,
    PairingBadParameter = 0x12,
    MaxUser = 0x13,
    // Keyturner service
    NotAuthorized = 0x20,
    BadPin = 0x21,
    BadNonce = 0x22,
    BadParameter = 0x23,
    InvalidAuthId = 0x24,
    Disabled = 0x25,
    RemoteNotAllowed = 0x26,
    TimeNotAllowed = 0x27,
    TooManyPinAttempts = 0x28,
    TooManyEntries = 0x29,
    CodeAlreadyExists = 0x2A,
    CodeInvalid = 0x2B,
    CodeInvalidTimeout1 = 0x2C,
    CodeInvalidTimeout2 = 0x2D,
    CodeInvalidTimeout3 = 0x2E,
    AutoUnlockTooRecent = 0x40,
    PositionUnknown = 0x41,
    MotorBlocked = 0x42,
    ClutchFailure = 0x43,
    MotorTimeout = 0x44,
    Busy = 0x45,
    Canceled = 0x46,
    NotCalibrated = 0x47,
    MotorPositionLimit = 0x48,
    MotorLowVoltage = 0x49,
    MotorPowerFailure = 0x4A,
    ClutchPowerFailure = 0x4B,
    VoltageTooLow = 0x4C,
    FirmwareUpdateNeeded = 0x4D,
}

impl DeviceError {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use DeviceError::*;
        Some(match byte {
            0xFD => BadCrc,
            0xFE => BadLength,
            0xFF => Unknown,
            0x10 => NotPairing,
            0x11 => BadAuthenticator,
            0x12 => PairingBadParameter,
            0x13 => MaxUser,
            0x20 => NotAuthorized,
            0x21 => BadPin,
            0x22 => BadNonce,
            0x23 => BadParameter,
            0x24 => InvalidAuthId,
            0x25 => Disabled,
            0x26 => RemoteNotAllowed,
            0x27 => TimeNotAllowed,
            0x28 => TooManyPinAttempts,
            0x29 => TooManyEntries,
            0x2A => CodeAlreadyExists,
            0x2B => CodeInvalid,
            0x2C => CodeInvalidTimeout1,
            0x2D => CodeInvalidTimeout2,
            0x2E => CodeInvalidTimeout3,
            0x40 => AutoUnlockTooRecent,
            0x41 => PositionUnknown,
            0x42 => MotorBlocked,
            0x43 => ClutchFailure,
            0x44 => MotorTimeout,
            0x45 => Busy,
            0x46 => Canceled,
            0x47 => NotCalibrated,
            0x48 => MotorPositionLimit,
            0x49 => MotorLowVoltage,
            0x4A => MotorPowerFailure,
            0x4B => ClutchPowerFailure,
            0x4C => VoltageTooLow,
            0x4D => FirmwareUpdateNeeded,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The lock is momentarily unable to serve the command.
    pub fn is_busy(self) -> bool {
        self == DeviceError::Busy
    }

    /// The lock no longer trusts our credentials.
    pub fn is_trust_rejected(self) -> bool {
        matches!(self, DeviceError::NotAuthorized | DeviceError::InvalidAuthId)
    }
}

/// Physical actions accepted by `Command::LockAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockAction {
    Unlock = 0x01,
    Lock = 0x02,
    Unlatch = 0x03,
    LockNgo = 0x04,
    LockNgoUnlatch = 0x05,
    FullLock = 0x06,
    FobAction1 = 0x81,
    FobAction2 = 0x82,
    FobAction3 = 0x83,
}

impl LockAction {
    pub fn code(self) -> u8 {
        self as u8
    }
}
