//! Ready-made actions for the common lock operations.
//!
//! Each constructor pins the command, its challenge discipline, and the
//! payload layout, so callers deal in intents rather than wire bytes.

use crate::commands::{Command, LockAction};
use crate::types::{Action, CommandType};

/// Perform a physical lock action (lock, unlock, unlatch, ...).
///
/// Payload: action(1) || app_id(u32 LE) || flags(1), optional name suffix.
pub fn lock_action(action: LockAction, app_id: u32, flags: u8) -> Action {
    let mut payload = Vec::with_capacity(6);
    payload.push(action.code());
    payload.extend_from_slice(&app_id.to_le_bytes());
    payload.push(flags);
    Action {
        command: Command::LockAction,
        command_type: CommandType::CommandWithChallengeAndAccept,
        payload,
    }
}

/// Read the keyturner state snapshot (lock state, battery, trigger).
pub fn request_keyturner_states() -> Action {
    Action {
        command: Command::RequestData,
        command_type: CommandType::Command,
        payload: Command::KeyturnerStates.code().to_le_bytes().to_vec(),
    }
}

/// Read the battery report.
pub fn request_battery_report() -> Action {
    Action {
        command: Command::RequestData,
        command_type: CommandType::Command,
        payload: Command::BatteryReport.code().to_le_bytes().to_vec(),
    }
}

/// Read the device configuration.
pub fn request_config() -> Action {
    Action {
        command: Command::RequestConfig,
        command_type: CommandType::CommandWithChallenge,
        payload: Vec::new(),
    }
}

/// Read the advanced configuration.
pub fn request_advanced_config() -> Action {
    Action {
        command: Command::RequestAdvancedConfig,
        command_type: CommandType::CommandWithChallenge,
        payload: Vec::new(),
    }
}

/// Enumerate authorization entries. PIN-protected.
///
/// Payload: offset(u16 LE) || count(u16 LE).
pub fn request_authorization_entries(offset: u16, count: u16) -> Action {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&offset.to_le_bytes());
    payload.extend_from_slice(&count.to_le_bytes());
    Action {
        command: Command::RequestAuthorizationEntries,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload,
    }
}

/// Enumerate keypad codes. PIN-protected.
pub fn request_keypad_codes(offset: u16, count: u16) -> Action {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&offset.to_le_bytes());
    payload.extend_from_slice(&count.to_le_bytes());
    Action {
        command: Command::RequestKeypadCodes,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload,
    }
}

/// Enumerate time control entries. PIN-protected.
pub fn request_time_control_entries() -> Action {
    Action {
        command: Command::RequestTimeControlEntries,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: Vec::new(),
    }
}

/// Fetch activity log entries, newest first. PIN-protected.
///
/// Payload: start_index(u32 LE) || count(u16 LE) || sort(1) || totals(1).
pub fn request_log_entries(start_index: u32, count: u16) -> Action {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&start_index.to_le_bytes());
    payload.extend_from_slice(&count.to_le_bytes());
    payload.push(0x01);
    payload.push(0x00);
    Action {
        command: Command::RequestLogEntries,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload,
    }
}

/// Change the security PIN. Payload carries the new PIN; the stored one
/// is appended by the challenge machinery.
pub fn set_security_pin(new_pin: u16) -> Action {
    Action {
        command: Command::SetSecurityPin,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: new_pin.to_le_bytes().to_vec(),
    }
}

/// Verify the stored security PIN against the lock.
pub fn verify_security_pin() -> Action {
    Action {
        command: Command::VerifySecurityPin,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: Vec::new(),
    }
}

/// Set the lock's wall clock. PIN-protected.
///
/// Payload: year(u16 LE) || month || day || hour || minute || second.
pub fn update_time(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Action {
    let mut payload = Vec::with_capacity(7);
    payload.extend_from_slice(&year.to_le_bytes());
    payload.extend_from_slice(&[month, day, hour, minute, second]);
    Action {
        command: Command::UpdateTime,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload,
    }
}

/// Write the device configuration. PIN-protected.
///
/// `config` is the device-defined configuration block, unchanged.
pub fn set_config(config: Vec<u8>) -> Action {
    Action {
        command: Command::SetConfig,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: config,
    }
}

/// Write the advanced configuration. PIN-protected.
pub fn set_advanced_config(config: Vec<u8>) -> Action {
    Action {
        command: Command::SetAdvancedConfig,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: config,
    }
}

/// Grant a new authorization. PIN-protected.
///
/// `entry` is the device-defined authorization entry layout.
pub fn add_authorization_entry(entry: Vec<u8>) -> Action {
    Action {
        command: Command::AuthorizationDataInvite,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: entry,
    }
}

/// Update an existing authorization entry. PIN-protected.
pub fn update_authorization_entry(entry: Vec<u8>) -> Action {
    Action {
        command: Command::UpdateAuthorizationEntry,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: entry,
    }
}

/// Revoke an authorization by id. PIN-protected.
pub fn remove_authorization_entry(auth_id: u32) -> Action {
    Action {
        command: Command::RemoveAuthorizationEntry,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: auth_id.to_le_bytes().to_vec(),
    }
}

/// Add a keypad code. PIN-protected.
///
/// `entry` is the device-defined keypad entry layout (code, name, limits).
pub fn add_keypad_code(entry: Vec<u8>) -> Action {
    Action {
        command: Command::AddKeypadCode,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: entry,
    }
}

/// Update a keypad code. PIN-protected.
pub fn update_keypad_code(entry: Vec<u8>) -> Action {
    Action {
        command: Command::UpdateKeypadCode,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: entry,
    }
}

/// Remove a keypad code by id. PIN-protected.
pub fn remove_keypad_code(code_id: u16) -> Action {
    Action {
        command: Command::RemoveKeypadCode,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: code_id.to_le_bytes().to_vec(),
    }
}

/// Add a time control entry. PIN-protected.
pub fn add_time_control_entry(entry: Vec<u8>) -> Action {
    Action {
        command: Command::AddTimeControlEntry,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: entry,
    }
}

/// Update a time control entry. PIN-protected.
pub fn update_time_control_entry(entry: Vec<u8>) -> Action {
    Action {
        command: Command::UpdateTimeControlEntry,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: entry,
    }
}

/// Remove a time control entry by id. PIN-protected.
pub fn remove_time_control_entry(entry_id: u8) -> Action {
    Action {
        command: Command::RemoveTimeControlEntry,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: vec![entry_id],
    }
}

/// Toggle the activity log. PIN-protected.
pub fn enable_logging(enabled: bool) -> Action {
    Action {
        command: Command::EnableLogging,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: vec![u8::from(enabled)],
    }
}

/// Start a calibration run. PIN-protected.
pub fn request_calibration() -> Action {
    Action {
        command: Command::RequestCalibration,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: Vec::new(),
    }
}

/// Reboot the device. PIN-protected.
pub fn request_reboot() -> Action {
    Action {
        command: Command::RequestReboot,
        command_type: CommandType::CommandWithChallengeAndPin,
        payload: Vec::new(),
    }
}
