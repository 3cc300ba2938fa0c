//! Minimal host-side round trip: encode a `get_clock` frame, feed it through
//! a fresh `Transport` as if it had arrived over the wire, and print what
//! came back out.

use klipper_proto::cursor::ScratchWriter;
use klipper_proto::transport::{self, ReceiveEvent, Transport};
use klipper_proto::MESSAGE_LENGTH_MAX;

fn main() {
    let mut buf = [0u8; MESSAGE_LENGTH_MAX];
    let mut w = ScratchWriter::new(&mut buf);
    // id 2 here only to illustrate the shape; a real host resolves the id
    // from the dictionary served during `identify`.
    transport::encode_frame(0x10, &mut w, |w| w.write_u32(2)).unwrap();
    let frame = w.as_slice().to_vec();
    println!("encoded {} bytes: {frame:02x?}", frame.len());

    let mut t = Transport::new();
    let (consumed, event) = t.receive(&frame);
    println!("consumed {consumed} bytes");
    match event {
        ReceiveEvent::Frame { payload, ack_seq, .. } => {
            println!("dispatchable payload: {payload:02x?}, ack_seq = {ack_seq:#x}");
        }
        other => println!("unexpected event: {other:?}"),
    }
}
