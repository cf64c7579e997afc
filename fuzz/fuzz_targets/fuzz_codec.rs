#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Destuffing must never panic on arbitrary wire noise
    let mut noise = data.to_vec();
    triton::vebus::codec::destuff(&mut noise);

    // Any payload survives the stuff/frame/destuff cycle
    let framed = triton::vebus::codec::prepare_frame(data, data.first().copied().unwrap_or(0));
    let mut body = framed[4..].to_vec();
    triton::vebus::codec::destuff(&mut body);
});
