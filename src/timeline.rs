use serde::Serialize;
use crate::job::LastAudioMode;

/// 一个场景在共享音轨上的窗口 `[start, start + duration)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AudioWindow {
    /// 脚本时间轴上的起点（秒）
    pub start_sec: f64,
    /// 请求的窗口长度（秒）
    pub duration_sec: f64,
    /// 补静音后的总长度（秒）
    pub pad_to_sec: Option<f64>,
}

impl AudioWindow {
    /// 按剩余音频截断后的实际切分长度
    pub fn cut_sec(&self, total_audio_sec: f64) -> f64 {
        let remaining = (total_audio_sec - self.start_sec).max(0.0);
        self.duration_sec.max(0.0).min(remaining)
    }

    /// 起点之后已没有可用音频
    pub fn is_past_end(&self, total_audio_sec: f64) -> bool {
        total_audio_sec - self.start_sec <= 0.0
    }

    /// 切分输出的最终时长：补静音时为 pad_to，否则为截断后的切分长度
    pub fn output_sec(&self, total_audio_sec: f64) -> f64 {
        self.pad_to_sec.unwrap_or_else(|| self.cut_sec(total_audio_sec))
    }
}

/// 脚本时间轴：只由声明的目标时长决定，与实际视频时长无关
#[derive(Debug, Clone)]
pub struct ScriptTimeline {
    windows: Vec<AudioWindow>,
}

impl ScriptTimeline {
    pub fn new(targets: &[f64], total_audio_sec: f64, last_audio: LastAudioMode) -> Self {
        let offsets = script_offsets(targets);
        let count = targets.len();

        let windows = targets
            .iter()
            .zip(offsets.iter())
            .enumerate()
            .map(|(i, (&target, &start))| {
                let is_last = i + 1 == count;
                let duration_sec = if is_last && last_audio == LastAudioMode::TakeRestOfAudio {
                    (total_audio_sec - start).max(0.0)
                } else {
                    target
                };
                AudioWindow {
                    start_sec: start,
                    duration_sec,
                    pad_to_sec: None,
                }
            })
            .collect();

        Self { windows }
    }

    pub fn window(&self, index: usize) -> Option<AudioWindow> {
        self.windows.get(index).copied()
    }
}

/// 前缀和：场景 i 的起点等于场景 0..i-1 目标时长之和
pub fn script_offsets(targets: &[f64]) -> Vec<f64> {
    targets
        .iter()
        .scan(0.0_f64, |acc, &target| {
            let start = *acc;
            *acc += target;
            Some(start)
        })
        .collect()
}

/// 视频比切出的音频长时，把音频窗口补静音到视频长度
pub fn pad_to_video(
    window: AudioWindow,
    video_sec: f64,
    total_audio_sec: f64,
    tolerance_sec: f64,
) -> AudioWindow {
    let cut = window.cut_sec(total_audio_sec);
    if video_sec > cut + tolerance_sec {
        AudioWindow {
            pad_to_sec: Some(video_sec),
            ..window
        }
    } else {
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_prefix_sums() {
        assert_eq!(script_offsets(&[4.0, 4.0, 4.0]), vec![0.0, 4.0, 8.0]);
        assert_eq!(script_offsets(&[1.5, 2.25, 0.75, 3.0]), vec![0.0, 1.5, 3.75, 4.5]);
        assert!(script_offsets(&[]).is_empty());
    }

    #[test]
    fn test_offsets_match_exact_sum() {
        let targets = [0.1, 0.2, 0.3, 0.4, 0.7, 1.1];
        let offsets = script_offsets(&targets);
        for i in 0..targets.len() {
            let expected: f64 = targets[..i].iter().sum();
            assert_eq!(offsets[i], expected, "场景 {}", i);
        }
    }

    #[test]
    fn test_windows_cap_to_remaining_audio() {
        let timeline = ScriptTimeline::new(&[4.0, 4.0, 4.0], 5.0, LastAudioMode::CapToTarget);
        let w: Vec<AudioWindow> = (0..3).map(|i| timeline.window(i).unwrap()).collect();

        assert_eq!((w[0].start_sec, w[0].cut_sec(5.0)), (0.0, 4.0));
        assert_eq!((w[1].start_sec, w[1].cut_sec(5.0)), (4.0, 1.0));
        assert_eq!((w[2].start_sec, w[2].cut_sec(5.0)), (8.0, 0.0));
        assert!(!w[1].is_past_end(5.0));
        assert!(w[2].is_past_end(5.0));
    }

    #[test]
    fn test_take_rest_of_audio() {
        let timeline = ScriptTimeline::new(&[2.0, 3.0], 9.5, LastAudioMode::TakeRestOfAudio);
        let last = timeline.window(1).unwrap();
        assert_eq!(last.start_sec, 2.0);
        assert_eq!(last.duration_sec, 7.5);

        // 配音比时间轴短时窗口长度为 0
        let timeline = ScriptTimeline::new(&[2.0, 3.0], 1.0, LastAudioMode::TakeRestOfAudio);
        assert_eq!(timeline.window(1).unwrap().duration_sec, 0.0);
    }

    #[test]
    fn test_pad_to_video_only_when_video_is_longer() {
        let window = AudioWindow { start_sec: 8.0, duration_sec: 4.0, pad_to_sec: None };

        let padded = pad_to_video(window, 5.5, 20.0, 0.03);
        assert_eq!(padded.pad_to_sec, Some(5.5));
        assert_eq!(padded.output_sec(20.0), 5.5);

        let same = pad_to_video(window, 4.01, 20.0, 0.03);
        assert_eq!(same.pad_to_sec, None);
        assert_eq!(same.output_sec(20.0), 4.0);
    }
}
