//! Simulator board bring-up: builds a [`klipper_mcu_firmware::Firmware`]
//! over the stdio-backed [`klipper_mcu_firmware::board::SimHal`] and drives
//! it from a plain polling loop, exactly as a bare-metal board's `main`
//! would drive it over a real UART/USB-CDC link. See `src/board.rs` for why
//! this exists instead of a bare-metal target.

use klipper_mcu_firmware::board::{SimAdc, SimClock, SimGpio, SimHal, SimI2c, SimPwm, SimSink, SimSpi};
use klipper_mcu_firmware::dictionary_gen;
use klipper_mcu_firmware::Firmware;

fn new_firmware(dictionary: &'static [u8]) -> Firmware<SimHal> {
    Firmware::new(SimGpio::new(), SimAdc::new(), SimPwm::new(), SimSpi, SimI2c, SimClock::new(), SimSink::new(), dictionary)
}

fn main() {
    let dictionary = dictionary_gen::build_dictionary("0.1.0-sim", "klipper-mcu-firmware-sim", klipper_mcu_firmware::board::SIM_CLOCK_FREQ);
    let dictionary: &'static [u8] = Box::leak(dictionary.into_boxed_slice());

    let mut fw = new_firmware(dictionary);

    loop {
        // A `reset` command defers the platform reset until after its own ACK
        // flushes (poll's last step). A full firmware restart re-initializes
        // the whole process, so the simulator's platform reset is simply
        // rebuilding Firmware from scratch, the same as power-cycling a real
        // board would.
        if fw.poll() {
            fw = new_firmware(dictionary);
        }
    }
}
