#![deny(clippy::all)]
#![deny(warnings)]

//! Name/format descriptor tables for every command and response the wire
//! contract requires.
//!
//! The registry is the source of truth for ids; these tables are the source
//! of truth for the name and format string each entry is registered with.
//! `klipper-mcu-firmware` walks [`REQUIRED_COMMANDS`] and attaches a handler
//! to each, and [`REQUIRED_RESPONSES`] to register the response-only
//! descriptors the dictionary also needs to know about.

/// A `"name format"` pair as it appears in the dictionary's `commands`/
/// `responses` maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub format: &'static str,
}

/// Every host-to-MCU command this firmware core must understand, in the
/// order commands.rs lists them (registration order past the two
/// bootstrap-mandated entries is implementation-defined).
pub const REQUIRED_COMMANDS: &[Descriptor] = &[
    Descriptor { name: "identify", format: "offset=%u count=%c" },
    Descriptor { name: "get_uptime", format: "" },
    Descriptor { name: "get_clock", format: "" },
    Descriptor { name: "get_config", format: "" },
    Descriptor { name: "config_reset", format: "" },
    Descriptor { name: "finalize_config", format: "crc=%u" },
    Descriptor { name: "allocate_oids", format: "count=%c" },
    Descriptor { name: "emergency_stop", format: "" },
    Descriptor { name: "reset", format: "" },
    Descriptor { name: "debug_read", format: "order=%c addr=%u" },
    Descriptor { name: "config_analog_in", format: "oid=%c pin=%u" },
    Descriptor {
        name: "query_analog_in",
        format: "oid=%c clock=%u sample_ticks=%u sample_count=%c rest_ticks=%u min_value=%hu max_value=%hu range_check_count=%c",
    },
    Descriptor {
        name: "config_digital_out",
        format: "oid=%c pin=%u value=%c default_value=%c max_duration=%u",
    },
    Descriptor { name: "queue_digital_out", format: "oid=%c clock=%u on_ticks=%u" },
    Descriptor { name: "update_digital_out", format: "oid=%c value=%c" },
    Descriptor { name: "set_digital_out_pwm_cycle", format: "oid=%c cycle_ticks=%u" },
    Descriptor {
        name: "config_pwm_out",
        format: "oid=%c pin=%u cycle_ticks=%u value=%hu default_value=%hu max_duration=%u",
    },
    Descriptor { name: "queue_pwm_out", format: "oid=%c clock=%u value=%hu" },
    Descriptor { name: "set_pwm_out", format: "oid=%c value=%hu" },
    Descriptor { name: "config_endstop", format: "oid=%c pin=%u pull_up=%c" },
    Descriptor {
        name: "endstop_home",
        format: "oid=%c clock=%u sample_ticks=%u sample_count=%c rest_ticks=%u pin_value=%c trsync_oid=%c trigger_reason=%c",
    },
    Descriptor { name: "endstop_query_state", format: "oid=%c" },
    Descriptor {
        name: "config_stepper",
        format: "oid=%c step_pin=%c dir_pin=%c invert_step=%c step_pulse_ticks=%u",
    },
    Descriptor { name: "queue_step", format: "oid=%c interval=%u count=%hu add=%hi" },
    Descriptor { name: "set_next_step_dir", format: "oid=%c dir=%c" },
    Descriptor { name: "reset_step_clock", format: "oid=%c clock=%u" },
    Descriptor { name: "stepper_get_position", format: "oid=%c" },
    Descriptor { name: "stepper_stop_on_trigger", format: "oid=%c trsync_oid=%c" },
    Descriptor { name: "trsync_start", format: "oid=%c report_clock=%u report_ticks=%u expire_reason=%c" },
    Descriptor { name: "trsync_set_timeout", format: "oid=%c clock=%u" },
    Descriptor { name: "trsync_trigger", format: "oid=%c reason=%c" },
    Descriptor { name: "config_i2c", format: "oid=%c" },
    Descriptor { name: "i2c_set_bus", format: "oid=%c bus=%u rate=%u address=%u" },
    Descriptor { name: "i2c_write", format: "oid=%c data=%*s" },
    Descriptor { name: "i2c_read", format: "oid=%c reg=%*s read_len=%u" },
    Descriptor { name: "config_spi", format: "oid=%c" },
    Descriptor { name: "config_spi_without_cs", format: "oid=%c" },
    Descriptor { name: "spi_set_bus", format: "oid=%c bus=%u mode=%c rate=%u" },
    Descriptor { name: "spi_transfer", format: "oid=%c data=%*s" },
    Descriptor { name: "spi_send", format: "oid=%c data=%*s" },
    Descriptor { name: "config_spi_shutdown", format: "oid=%c spi_oid=%c shutdown_msg=%*s" },
];

/// Every MCU-to-host response this firmware core emits.
pub const REQUIRED_RESPONSES: &[Descriptor] = &[
    Descriptor { name: "identify_response", format: "offset=%u data=%*s" },
    Descriptor { name: "clock", format: "clock=%u" },
    Descriptor { name: "uptime", format: "high=%u clock=%u" },
    Descriptor { name: "config", format: "is_config=%c crc=%u is_shutdown=%c move_count=%hu" },
    Descriptor { name: "analog_in_state", format: "oid=%c next_clock=%u value=%hu" },
    Descriptor { name: "endstop_state", format: "oid=%c homing=%c pin_value=%c" },
    Descriptor { name: "trsync_state", format: "oid=%c can_trigger=%c trigger_reason=%c clock=%u" },
    Descriptor { name: "stepper_position", format: "oid=%c pos=%i" },
    Descriptor { name: "spi_transfer_response", format: "oid=%c response=%*s" },
    Descriptor { name: "i2c_read_response", format: "oid=%c response=%*s" },
    Descriptor { name: "debug_result", format: "value=%u" },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_is_first_required_command() {
        assert_eq!(REQUIRED_COMMANDS[0].name, "identify");
    }

    #[test]
    fn identify_response_is_first_required_response() {
        assert_eq!(REQUIRED_RESPONSES[0].name, "identify_response");
    }

    #[test]
    fn no_duplicate_command_names() {
        for (i, a) in REQUIRED_COMMANDS.iter().enumerate() {
            for b in &REQUIRED_COMMANDS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
