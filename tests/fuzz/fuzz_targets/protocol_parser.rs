#![no_main]

use klipper_proto::transport::Transport;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feeds arbitrary bytes through the frame receiver, repeatedly, as a
    // real byte stream would. Transport::receive must never panic on any
    // input, matching spec §7's "malformed input never crashes" contract.
    let mut transport = Transport::new();
    let mut remaining = data;
    let mut iterations = 0;
    while !remaining.is_empty() && iterations < 10_000 {
        let (consumed, _event) = transport.receive(remaining);
        if consumed == 0 {
            break;
        }
        remaining = &remaining[consumed..];
        iterations += 1;
    }
});
