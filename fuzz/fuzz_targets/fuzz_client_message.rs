#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The client never parses its own messages in production, but a server
    // implementation will; keep the decode path free of panics.
    let _ = serde_json::from_slice::<plaza_client::protocol::ClientMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<plaza_client::protocol::ClientMessage>(s);
    }
});
