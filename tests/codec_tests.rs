// Unit tests for the wire audio codec
//
// Encoding clamps out-of-range samples; decoding rejects malformed payloads
// without taking the session down.

use astra_voice::audio::codec::{
    decode_base64, decode_samples, encode_base64, encode_samples, CodecError,
};

#[test]
fn test_roundtrip_within_quantization_error() {
    let original: Vec<f32> = (0..512)
        .map(|i| (i as f32 / 512.0 * std::f32::consts::TAU).sin() * 0.8)
        .collect();

    let encoded = encode_base64(&original);
    let decoded = decode_base64(&encoded, 16000, 1).expect("roundtrip should decode");

    assert_eq!(decoded.samples.len(), original.len());
    assert_eq!(decoded.sample_rate, 16000);
    assert_eq!(decoded.channels, 1);
    for (expected, actual) in original.iter().zip(decoded.samples.iter()) {
        assert!(
            (expected - actual).abs() <= 1.0 / 32768.0,
            "quantization error too large: {} vs {}",
            expected,
            actual
        );
    }
}

#[test]
fn test_encode_clamps_out_of_range_samples() {
    let bytes = encode_samples(&[2.0, -2.0]);
    let decoded = decode_samples(&bytes, 24000, 1).unwrap();

    assert!((decoded.samples[0] - 32767.0 / 32768.0).abs() < 1e-6);
    assert!((decoded.samples[1] + 1.0).abs() < 1e-6);
}

#[test]
fn test_decode_rejects_odd_byte_count() {
    let result = decode_samples(&[0x01, 0x02, 0x03], 24000, 1);
    assert!(matches!(result, Err(CodecError::OddLength(3))));
}

#[test]
fn test_decode_rejects_empty_payload() {
    assert!(matches!(decode_samples(&[], 24000, 1), Err(CodecError::Empty)));
    assert!(matches!(decode_base64("", 24000, 1), Err(CodecError::Empty)));
}

#[test]
fn test_decode_rejects_invalid_base64() {
    let result = decode_base64("not base64!!!", 24000, 1);
    assert!(matches!(result, Err(CodecError::Base64(_))));
}

#[test]
fn test_decoded_buffer_duration() {
    let samples = vec![0.0f32; 12000];
    let decoded = decode_samples(&encode_samples(&samples), 24000, 1).unwrap();
    assert!((decoded.duration_secs() - 0.5).abs() < 1e-9, "12000 samples at 24kHz is 0.5s");
}

#[test]
fn test_encode_is_little_endian() {
    // 0.5 * 32768 = 16384 = 0x4000
    let bytes = encode_samples(&[0.5]);
    assert_eq!(bytes, vec![0x00, 0x40]);
}
