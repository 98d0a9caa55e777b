//! Измерение длительности аудио через symphonia

use std::io::Cursor;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SyncError};

/// Длительность аудио в секундах
///
/// Берется из заголовка, если формат ее сообщает; иначе по меткам пакетов.
pub fn measure_duration(audio: &[u8], extension: Option<&str>) -> Result<f64> {
    let cursor = Cursor::new(audio.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SyncError::AudioProcessing(format!("Unsupported audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SyncError::AudioProcessing("No audio track found".to_string()))?;

    let track_id = track.id;
    let params = track.codec_params.clone();

    if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        if frames > 0 && rate > 0 {
            return Ok(frames as f64 / rate as f64);
        }
    }

    let mut end_ts = 0u64;
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        end_ts = end_ts.max(packet.ts() + packet.dur());
    }

    if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(end_ts);
        Ok(time.seconds as f64 + time.frac)
    } else if let Some(rate) = params.sample_rate.filter(|r| *r > 0) {
        Ok(end_ts as f64 / rate as f64)
    } else {
        Err(SyncError::AudioProcessing(
            "Audio stream has no timing information".to_string(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Моно WAV 16 бит с тишиной
    pub(crate) fn wav_bytes(sample_rate: u32, samples: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let mut wav = Vec::with_capacity(44 + data_len as usize);
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        wav.resize(44 + data_len as usize, 0);
        wav
    }

    #[test]
    fn test_wav_duration() {
        let wav = wav_bytes(8000, 4000);
        let duration = measure_duration(&wav, Some("wav")).unwrap();
        assert!((duration - 0.5).abs() < 1e-6);

        let duration = measure_duration(&wav_bytes(16000, 24000), None).unwrap();
        assert!((duration - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = measure_duration(b"definitely not audio", Some("mp3"));
        assert!(matches!(result, Err(SyncError::AudioProcessing(_))));
    }
}
