//! # Command dispatch
//!
//! Bootstraps the registry with every required command/response and holds
//! the one handler function per command. This is the only module that
//! understands both wire formats (via [`klipper_proto::commands`]) and
//! peripheral objects (via [`crate::firmware::Slot`]) at once; every other
//! module stays ignorant of the other side.

use heapless::Vec;

use klipper_proto::commands;
use klipper_proto::cursor::BytesCursor;
use klipper_proto::registry::CommandRegistry;
use klipper_proto::Error;

use crate::analog_in::{self, AnalogIn};
use crate::digital_out::{self, DigitalOut};
use crate::endstop::{self, Endstop};
use crate::firmware::{Firmware, Slot, MAX_COMMANDS, MAX_OIDS};
use crate::hal::{AdcDriver, Clock, GpioDriver, HalBundle, I2cDriver, PwmDriver, SpiDriver, StepperBackend};
use crate::i2c_device::I2cDevice;
use crate::pwm_out::{self, HardwarePwm};
use crate::scheduler::{Component, TimerOutcome, TimerToken};
use crate::shutdown::ShutdownCause;
use crate::spi_device::SpiDevice;
use crate::stepper::{self, Stepper};
use crate::trsync::{self, Trsync};

/// `identify`'s chunk size cap, matching the reference firmware's response
/// budget (well under `MESSAGE_LENGTH_MAX` once framing overhead is added).
const IDENTIFY_CHUNK_MAX: usize = 40;
/// Scratch capacity for one `i2c_read`. Register reads in practice never
/// approach this; boards needing more should widen it.
const I2C_READ_MAX: usize = 32;
/// Scratch capacity for one `spi_transfer`/`spi_send`.
const SPI_BUF_MAX: usize = 32;

/// Registers `identify_response`/`identify` first (ids 0 and 1, matching
/// every real Klipper dictionary), then every other required command and
/// response. Registration is idempotent by name, so re-registering the
/// bootstrap pair via the `REQUIRED_*` tables below is harmless.
pub(crate) fn register_all<H: HalBundle>(reg: &mut CommandRegistry<Firmware<H>, MAX_COMMANDS>) {
    let _ = reg.register_response("identify_response", "offset=%u data=%*s");
    let _ = reg.register_command("identify", "offset=%u count=%c", handle_identify::<H>);
    for d in commands::REQUIRED_RESPONSES {
        let _ = reg.register_response(d.name, d.format);
    }
    for d in commands::REQUIRED_COMMANDS {
        let handler = command_handler::<H>(d.name);
        let _ = reg.register_command(d.name, d.format, handler);
    }
}

fn command_handler<H: HalBundle>(name: &str) -> fn(&mut Firmware<H>, &mut BytesCursor) -> Result<(), Error> {
    match name {
        "identify" => handle_identify::<H>,
        "get_uptime" => handle_get_uptime::<H>,
        "get_clock" => handle_get_clock::<H>,
        "get_config" => handle_get_config::<H>,
        "config_reset" => handle_config_reset::<H>,
        "finalize_config" => handle_finalize_config::<H>,
        "allocate_oids" => handle_allocate_oids::<H>,
        "emergency_stop" => handle_emergency_stop::<H>,
        "reset" => handle_reset::<H>,
        "debug_read" => handle_debug_read::<H>,
        "config_analog_in" => handle_config_analog_in::<H>,
        "query_analog_in" => handle_query_analog_in::<H>,
        "config_digital_out" => handle_config_digital_out::<H>,
        "queue_digital_out" => handle_queue_digital_out::<H>,
        "update_digital_out" => handle_update_digital_out::<H>,
        "set_digital_out_pwm_cycle" => handle_set_digital_out_pwm_cycle::<H>,
        "config_pwm_out" => handle_config_pwm_out::<H>,
        "queue_pwm_out" => handle_queue_pwm_out::<H>,
        "set_pwm_out" => handle_set_pwm_out::<H>,
        "config_endstop" => handle_config_endstop::<H>,
        "endstop_home" => handle_endstop_home::<H>,
        "endstop_query_state" => handle_endstop_query_state::<H>,
        "config_stepper" => handle_config_stepper::<H>,
        "queue_step" => handle_queue_step::<H>,
        "set_next_step_dir" => handle_set_next_step_dir::<H>,
        "reset_step_clock" => handle_reset_step_clock::<H>,
        "stepper_get_position" => handle_stepper_get_position::<H>,
        "stepper_stop_on_trigger" => handle_stepper_stop_on_trigger::<H>,
        "trsync_start" => handle_trsync_start::<H>,
        "trsync_set_timeout" => handle_trsync_set_timeout::<H>,
        "trsync_trigger" => handle_trsync_trigger::<H>,
        "config_i2c" => handle_config_i2c::<H>,
        "i2c_set_bus" => handle_i2c_set_bus::<H>,
        "i2c_write" => handle_i2c_write::<H>,
        "i2c_read" => handle_i2c_read::<H>,
        "config_spi" => handle_config_spi::<H>,
        "config_spi_without_cs" => handle_config_spi_without_cs::<H>,
        "spi_set_bus" => handle_spi_set_bus::<H>,
        "spi_transfer" => handle_spi_transfer::<H>,
        "spi_send" => handle_spi_send::<H>,
        "config_spi_shutdown" => handle_config_spi_shutdown::<H>,
        _ => handle_unknown::<H>,
    }
}

fn handle_unknown<H: HalBundle>(_fw: &mut Firmware<H>, _cursor: &mut BytesCursor) -> Result<(), Error> {
    Err(Error::HandlerRejected)
}

fn handle_identify<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let offset = cursor.read_u32()? as usize;
    let count = cursor.read_u8()? as usize;
    let dict = fw.dictionary();
    let start = offset.min(dict.len());
    let end = start.saturating_add(count.min(IDENTIFY_CHUNK_MAX)).min(dict.len());
    let chunk = &dict[start..end];
    let id = fw.response_id("identify_response");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(offset as u32)?;
        w.write_bytes(chunk)
    });
    Ok(())
}

fn handle_get_uptime<H: HalBundle>(fw: &mut Firmware<H>, _cursor: &mut BytesCursor) -> Result<(), Error> {
    let uptime = fw.clock.uptime();
    let id = fw.response_id("uptime");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32((uptime >> 32) as u32)?;
        w.write_u32(uptime as u32)
    });
    Ok(())
}

fn handle_get_clock<H: HalBundle>(fw: &mut Firmware<H>, _cursor: &mut BytesCursor) -> Result<(), Error> {
    let clock = fw.clock.now();
    let id = fw.response_id("clock");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(clock)
    });
    Ok(())
}

fn handle_get_config<H: HalBundle>(fw: &mut Firmware<H>, _cursor: &mut BytesCursor) -> Result<(), Error> {
    let move_count = fw
        .oids
        .iter()
        .map(|s| match s {
            Slot::Stepper(st) => st.queued_moves(),
            _ => 0,
        })
        .fold(0u16, |a, b| a.saturating_add(b));
    let is_config = fw.config_finalized as u32;
    let crc = fw.state.config_crc();
    let is_shutdown = fw.state.is_shutdown() as u32;
    let id = fw.response_id("config");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(is_config)?;
        w.write_u32(crc)?;
        w.write_u32(is_shutdown)?;
        w.write_u32(move_count as u32)
    });
    Ok(())
}

fn handle_config_reset<H: HalBundle>(fw: &mut Firmware<H>, _cursor: &mut BytesCursor) -> Result<(), Error> {
    fw.state.clear_for_reset();
    fw.config_finalized = false;
    fw.oids.clear();
    Ok(())
}

fn handle_finalize_config<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let crc = cursor.read_u32()?;
    fw.state.set_config_crc(crc);
    fw.config_finalized = true;
    Ok(())
}

fn handle_allocate_oids<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let count = cursor.read_u8()? as usize;
    if !fw.oids.is_empty() {
        return Err(Error::HandlerRejected);
    }
    for _ in 0..count {
        fw.oids.push(Slot::Empty).map_err(|_| Error::HandlerRejected)?;
    }
    Ok(())
}

fn handle_emergency_stop<H: HalBundle>(fw: &mut Firmware<H>, _cursor: &mut BytesCursor) -> Result<(), Error> {
    fw.try_shutdown(ShutdownCause::HostRequested);
    Ok(())
}

fn handle_reset<H: HalBundle>(fw: &mut Firmware<H>, _cursor: &mut BytesCursor) -> Result<(), Error> {
    fw.state.request_reset();
    Ok(())
}

fn handle_debug_read<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let _order = cursor.read_u8()?;
    let _addr = cursor.read_u32()?;
    let id = fw.response_id("debug_result");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(0)
    });
    Ok(())
}

fn handle_config_analog_in<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let pin = cursor.read_u32()? as u16;
    fw.adc.configure_channel(pin).map_err(|_| Error::HandlerRejected)?;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::AnalogIn(AnalogIn::new(pin));
    Ok(())
}

fn handle_query_analog_in<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let clock = cursor.read_u32()?;
    let sample_ticks = cursor.read_u32()?;
    let sample_count = cursor.read_u8()?;
    let rest_ticks = cursor.read_u32()?;
    let min_value = cursor.read_u16()?;
    let max_value = cursor.read_u16()?;
    let range_check_count = cursor.read_u8()?;
    let wake = match fw.oids.get_mut(oid as usize) {
        Some(Slot::AnalogIn(a)) => {
            a.query(clock, sample_ticks, sample_count, rest_ticks, min_value, max_value, range_check_count)
        }
        _ => return Err(Error::HandlerRejected),
    };
    if let Some(wake_time) = wake {
        analog_in::arm(&mut fw.scheduler, oid, wake_time);
    }
    Ok(())
}

fn handle_config_digital_out<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let pin = cursor.read_u32()? as u16;
    let value = cursor.read_u8()? != 0;
    let default_value = cursor.read_u8()? != 0;
    let max_duration = cursor.read_u32()?;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::DigitalOut(DigitalOut::new(oid as u16, pin, default_value));
    match slot {
        Slot::DigitalOut(d) => d.configure(&mut fw.gpio, value, max_duration).map_err(|_| Error::HandlerRejected),
        _ => unreachable!(),
    }
}

fn handle_queue_digital_out<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let clock = cursor.read_u32()?;
    let on_ticks = cursor.read_u32()?;
    match fw.oids.get_mut(oid as usize) {
        Some(Slot::DigitalOut(d)) => {
            d.queue(on_ticks);
        }
        _ => return Err(Error::HandlerRejected),
    }
    digital_out::arm_load(&mut fw.scheduler, oid, clock);
    Ok(())
}

fn handle_update_digital_out<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let value = cursor.read_u8()? != 0;
    match fw.oids.get_mut(oid) {
        Some(Slot::DigitalOut(d)) => d.set_immediate(&mut fw.gpio, value).map_err(|_| Error::HandlerRejected),
        _ => Err(Error::HandlerRejected),
    }
}

fn handle_set_digital_out_pwm_cycle<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let cycle_ticks = cursor.read_u32()?;
    match fw.oids.get_mut(oid) {
        Some(Slot::DigitalOut(d)) => {
            d.set_pwm_cycle(cycle_ticks);
            Ok(())
        }
        _ => Err(Error::HandlerRejected),
    }
}

fn handle_config_pwm_out<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let pin = cursor.read_u32()? as u16;
    let cycle_ticks = cursor.read_u32()?;
    let value = cursor.read_u16()?;
    let default_value = cursor.read_u16()?;
    let max_duration = cursor.read_u32()?;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::HardwarePwm(HardwarePwm::new(oid as u16, pin));
    match slot {
        Slot::HardwarePwm(p) => p
            .configure(&mut fw.pwm, cycle_ticks, value, default_value, max_duration)
            .map_err(|_| Error::HandlerRejected),
        _ => unreachable!(),
    }
}

fn handle_queue_pwm_out<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let clock = cursor.read_u32()?;
    let value = cursor.read_u16()?;
    match fw.oids.get_mut(oid as usize) {
        Some(Slot::HardwarePwm(p)) => {
            p.queue(value);
        }
        _ => return Err(Error::HandlerRejected),
    }
    pwm_out::arm_load(&mut fw.scheduler, oid, clock);
    Ok(())
}

fn handle_set_pwm_out<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let value = cursor.read_u16()?;
    let now = fw.clock.now();
    let wake = match fw.oids.get_mut(oid as usize) {
        Some(Slot::HardwarePwm(p)) => p.set(&mut fw.pwm, now, value).map_err(|_| Error::HandlerRejected)?,
        _ => return Err(Error::HandlerRejected),
    };
    if let Some(end) = wake {
        pwm_out::arm_end(&mut fw.scheduler, oid, end);
    }
    Ok(())
}

fn handle_config_endstop<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let pin = cursor.read_u32()? as u16;
    let pull_up = cursor.read_u8()? != 0;
    fw.gpio.configure_input(pin, pull_up).map_err(|_| Error::HandlerRejected)?;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::Endstop(Endstop::new(pin));
    Ok(())
}

fn handle_endstop_home<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let clock = cursor.read_u32()?;
    let sample_ticks = cursor.read_u32()?;
    let sample_count = cursor.read_u8()?;
    let rest_ticks = cursor.read_u32()?;
    let pin_value = cursor.read_u8()? != 0;
    let trsync_oid = cursor.read_u8()? as u16;
    let trigger_reason = cursor.read_u8()?;
    let wake = match fw.oids.get_mut(oid as usize) {
        Some(Slot::Endstop(e)) => e.home(clock, sample_ticks, sample_count, rest_ticks, pin_value, trsync_oid, trigger_reason),
        _ => return Err(Error::HandlerRejected),
    };
    endstop::arm(&mut fw.scheduler, oid, wake);
    Ok(())
}

fn handle_endstop_query_state<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let snap = match fw.oids.get(oid) {
        Some(Slot::Endstop(e)) => e.query_state(),
        _ => return Err(Error::HandlerRejected),
    };
    let id = fw.response_id("endstop_state");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(oid as u32)?;
        w.write_u32(snap.homing as u32)?;
        w.write_u32(snap.pin_value as u32)
    });
    Ok(())
}

fn handle_config_stepper<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let step_pin = cursor.read_u8()? as u16;
    let dir_pin = cursor.read_u8()? as u16;
    let invert_step = cursor.read_u8()? != 0;
    let step_pulse_ticks = cursor.read_u32()?;
    let backend = H::Stepper::new(step_pin, dir_pin);
    let stepper = Stepper::new(backend, invert_step, false, step_pulse_ticks).map_err(|_| Error::HandlerRejected)?;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::Stepper(stepper);
    Ok(())
}

fn handle_queue_step<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let interval = cursor.read_u32()?;
    let count = cursor.read_u16()?;
    let add = cursor.read_i16()?;
    let wake = match fw.oids.get_mut(oid as usize) {
        Some(Slot::Stepper(s)) => s.queue_step(interval, count, add).map_err(|_| Error::HandlerRejected)?,
        _ => return Err(Error::HandlerRejected),
    };
    if let Some(wake_time) = wake {
        stepper::arm(&mut fw.scheduler, oid, wake_time);
    }
    Ok(())
}

fn handle_set_next_step_dir<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let dir = cursor.read_u8()? != 0;
    match fw.oids.get_mut(oid) {
        Some(Slot::Stepper(s)) => {
            s.set_next_step_dir(dir);
            Ok(())
        }
        _ => Err(Error::HandlerRejected),
    }
}

fn handle_reset_step_clock<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let clock = cursor.read_u32()?;
    let wake = match fw.oids.get_mut(oid as usize) {
        Some(Slot::Stepper(s)) => s.reset_step_clock(clock),
        _ => return Err(Error::HandlerRejected),
    };
    if let Some(wake_time) = wake {
        stepper::arm(&mut fw.scheduler, oid, wake_time);
    }
    Ok(())
}

fn handle_stepper_get_position<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let pos = match fw.oids.get(oid) {
        Some(Slot::Stepper(s)) => s.position(),
        _ => return Err(Error::HandlerRejected),
    };
    let id = fw.response_id("stepper_position");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(oid as u32)?;
        w.write_i32(pos as i32)
    });
    Ok(())
}

/// `stepper_stop_on_trigger(oid, trsync_oid)` registers `oid`'s stepper to
/// be halted the next time `trsync_oid`'s trsync fires, rather than firing
/// anything itself.
fn handle_stepper_stop_on_trigger<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let trsync_oid = cursor.read_u8()? as usize;
    match fw.oids.get_mut(trsync_oid) {
        Some(Slot::Trsync(t)) => t.register_signal(oid).map_err(|_| Error::HandlerRejected),
        _ => Err(Error::HandlerRejected),
    }
}

fn handle_trsync_start<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let report_clock = cursor.read_u32()?;
    let report_ticks = cursor.read_u32()?;
    let expire_reason = cursor.read_u8()?;
    let slot = fw.oids.get_mut(oid as usize).ok_or(Error::HandlerRejected)?;
    if !matches!(slot, Slot::Trsync(_)) {
        *slot = Slot::Trsync(Trsync::new());
    }
    match slot {
        Slot::Trsync(t) => t.start(report_clock, report_ticks, expire_reason),
        _ => unreachable!(),
    }
    if report_ticks != 0 {
        trsync::arm_report(&mut fw.scheduler, oid, report_clock);
    }
    Ok(())
}

fn handle_trsync_set_timeout<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let clock = cursor.read_u32()?;
    if !matches!(fw.oids.get(oid as usize), Some(Slot::Trsync(_))) {
        return Err(Error::HandlerRejected);
    }
    trsync::arm_expire(&mut fw.scheduler, oid, clock);
    Ok(())
}

fn handle_trsync_trigger<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as u16;
    let reason = cursor.read_u8()?;
    match fw.oids.get_mut(oid as usize) {
        Some(Slot::Trsync(t)) => t.do_trigger(reason),
        _ => return Err(Error::HandlerRejected),
    }
    drain_trsync_signals(&mut fw.oids, oid as usize);
    Ok(())
}

fn handle_config_i2c<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::I2c(I2cDevice::new());
    Ok(())
}

fn handle_i2c_set_bus<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let bus = cursor.read_u32()? as u8;
    let _rate = cursor.read_u32()?;
    let address = cursor.read_u32()? as u8;
    match fw.oids.get_mut(oid) {
        Some(Slot::I2c(d)) => {
            d.set_bus(bus, address);
            Ok(())
        }
        _ => Err(Error::HandlerRejected),
    }
}

fn handle_i2c_write<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let data = cursor.read_bytes()?;
    let result = match fw.oids.get_mut(oid) {
        Some(Slot::I2c(d)) => d.write(&mut fw.i2c, data),
        _ => return Err(Error::HandlerRejected),
    };
    if let Err(cause) = result {
        fw.try_shutdown(cause);
    }
    Ok(())
}

fn handle_i2c_read<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let reg = cursor.read_bytes()?;
    let read_len = cursor.read_u32()? as usize;
    let mut buf = [0u8; I2C_READ_MAX];
    let len = read_len.min(buf.len());
    let result = match fw.oids.get_mut(oid) {
        Some(Slot::I2c(d)) => d.read(&mut fw.i2c, reg, &mut buf[..len]),
        _ => return Err(Error::HandlerRejected),
    };
    if let Err(cause) = result {
        fw.try_shutdown(cause);
        return Ok(());
    }
    let id = fw.response_id("i2c_read_response");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(oid as u32)?;
        w.write_bytes(&buf[..len])
    });
    Ok(())
}

fn handle_config_spi<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::Spi(SpiDevice::new(true));
    Ok(())
}

fn handle_config_spi_without_cs<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let slot = fw.oids.get_mut(oid).ok_or(Error::HandlerRejected)?;
    *slot = Slot::Spi(SpiDevice::new(false));
    Ok(())
}

fn handle_spi_set_bus<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let bus = cursor.read_u32()? as u8;
    let _mode = cursor.read_u8()?;
    let _rate = cursor.read_u32()?;
    match fw.oids.get_mut(oid) {
        Some(Slot::Spi(d)) => {
            d.set_bus(bus);
            Ok(())
        }
        _ => Err(Error::HandlerRejected),
    }
}

fn handle_spi_transfer<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let data = cursor.read_bytes()?;
    let mut buf = [0u8; SPI_BUF_MAX];
    let len = data.len().min(buf.len());
    buf[..len].copy_from_slice(&data[..len]);
    let result = match fw.oids.get_mut(oid) {
        Some(Slot::Spi(d)) => d.transfer(&mut fw.spi, &mut buf[..len]),
        _ => return Err(Error::HandlerRejected),
    };
    if let Err(cause) = result {
        fw.try_shutdown(cause);
        return Ok(());
    }
    let id = fw.response_id("spi_transfer_response");
    fw.send_response(|w| {
        w.write_u32(id as u32)?;
        w.write_u32(oid as u32)?;
        w.write_bytes(&buf[..len])
    });
    Ok(())
}

fn handle_spi_send<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let oid = cursor.read_u8()? as usize;
    let data = cursor.read_bytes()?;
    let result = match fw.oids.get_mut(oid) {
        Some(Slot::Spi(d)) => d.send(&mut fw.spi, data),
        _ => return Err(Error::HandlerRejected),
    };
    if let Err(cause) = result {
        fw.try_shutdown(cause);
    }
    Ok(())
}

fn handle_config_spi_shutdown<H: HalBundle>(fw: &mut Firmware<H>, cursor: &mut BytesCursor) -> Result<(), Error> {
    let _oid = cursor.read_u8()?;
    let spi_oid = cursor.read_u8()? as usize;
    let msg = cursor.read_bytes()?;
    match fw.oids.get_mut(spi_oid) {
        Some(Slot::Spi(d)) => {
            d.config_shutdown_message(msg);
            Ok(())
        }
        _ => Err(Error::HandlerRejected),
    }
}

/// Routes one fired [`TimerToken`] to its owning peripheral. Returns the
/// scheduler outcome plus a shutdown cause, if the fire itself demands one
/// (an ADC range fault is the only source today; bus errors on scheduled
/// work are not currently routed through the timer path).
pub(crate) fn fire_timer<H: HalBundle>(
    oids: &mut Vec<Slot<H>, MAX_OIDS>,
    gpio: &mut H::Gpio,
    adc: &mut H::Adc,
    pwm: &mut H::Pwm,
    token: TimerToken,
    wake_time: u32,
) -> (TimerOutcome, Option<ShutdownCause>) {
    let oid = token.oid() as usize;
    match token.component() {
        Component::Stepper => match oids.get_mut(oid) {
            Some(Slot::Stepper(s)) => match s.on_step_timer(wake_time) {
                Ok(outcome) => (outcome, None),
                Err(_) => (TimerOutcome::Done, Some(ShutdownCause::QueueOverflow)),
            },
            _ => (TimerOutcome::Done, None),
        },
        Component::AnalogIn => match oids.get_mut(oid) {
            Some(Slot::AnalogIn(a)) => a.on_sample_timer(wake_time, adc),
            _ => (TimerOutcome::Done, None),
        },
        Component::DigitalOutLoad => match oids.get_mut(oid) {
            Some(Slot::DigitalOut(d)) => match d.load_event(gpio, wake_time) {
                Ok(o) => (o, None),
                Err(_) => (TimerOutcome::Done, None),
            },
            _ => (TimerOutcome::Done, None),
        },
        Component::DigitalOutToggle => match oids.get_mut(oid) {
            Some(Slot::DigitalOut(d)) => match d.toggle_event(gpio, wake_time) {
                Ok(o) => (o, None),
                Err(_) => (TimerOutcome::Done, None),
            },
            _ => (TimerOutcome::Done, None),
        },
        Component::DigitalOutEnd => match oids.get_mut(oid) {
            Some(Slot::DigitalOut(d)) => match d.end_event(gpio) {
                Ok(o) => (o, None),
                Err(_) => (TimerOutcome::Done, None),
            },
            _ => (TimerOutcome::Done, None),
        },
        Component::PwmLoad => match oids.get_mut(oid) {
            Some(Slot::HardwarePwm(p)) => match p.load_event(pwm, wake_time) {
                Ok(o) => (o, None),
                Err(_) => (TimerOutcome::Done, None),
            },
            _ => (TimerOutcome::Done, None),
        },
        Component::PwmEnd => match oids.get_mut(oid) {
            Some(Slot::HardwarePwm(p)) => match p.end_event(pwm) {
                Ok(o) => (o, None),
                Err(_) => (TimerOutcome::Done, None),
            },
            _ => (TimerOutcome::Done, None),
        },
        Component::Endstop => {
            let trsync_oid = match oids.get(oid) {
                Some(Slot::Endstop(e)) => e.trsync_oid() as usize,
                _ => return (TimerOutcome::Done, None),
            };
            let Some(slot) = oids.get_mut(trsync_oid) else {
                return (TimerOutcome::Done, None);
            };
            if !matches!(slot, Slot::Trsync(_)) {
                return (TimerOutcome::Done, None);
            }
            let mut trsync_slot = core::mem::replace(slot, Slot::Empty);
            let Slot::Trsync(tr) = &mut trsync_slot else { unreachable!() };
            let result = match oids.get_mut(oid) {
                Some(Slot::Endstop(e)) => e.on_timer(wake_time, gpio, tr),
                _ => Ok((TimerOutcome::Done, false)),
            };
            if let Some(slot) = oids.get_mut(trsync_oid) {
                *slot = trsync_slot;
            }
            drain_trsync_signals(oids, trsync_oid);
            match result {
                Ok((outcome, _fired)) => (outcome, None),
                Err(_) => (TimerOutcome::Done, None),
            }
        }
        Component::TrsyncReport => match oids.get_mut(oid) {
            Some(Slot::Trsync(t)) => (t.on_report_timer(wake_time), None),
            _ => (TimerOutcome::Done, None),
        },
        Component::TrsyncExpire => {
            let outcome = match oids.get_mut(oid) {
                Some(Slot::Trsync(t)) => t.on_expire_timer(),
                _ => return (TimerOutcome::Done, None),
            };
            drain_trsync_signals(oids, oid);
            (outcome, None)
        }
    }
}

/// Drains `trsync_oid`'s pending signal targets (if its just-fired trigger
/// has any) and stops each named stepper.
fn drain_trsync_signals<H: HalBundle>(oids: &mut Vec<Slot<H>, MAX_OIDS>, trsync_oid: usize) {
    let targets = match oids.get_mut(trsync_oid) {
        Some(Slot::Trsync(t)) => t.take_signal_targets(),
        _ => None,
    };
    let Some(targets) = targets else { return };
    for target_oid in targets {
        if let Some(Slot::Stepper(s)) = oids.get_mut(target_oid as usize) {
            s.stop_on_trigger();
        }
    }
}
