//! Планировщик бюджета кадров
//!
//! Оценивает длительность озвучки по количеству символов текста и выводит
//! целевое число кадров и потолок для потокового режима. Оценка заведомо
//! приблизительная (символы, а не длительность аудио): она ограничивает
//! худшую стоимость генерации, а не претендует на акустическую точность.

use crate::job::Mode;

/// Средняя скорость речи, символов в секунду
pub const CHARS_PER_SECOND: f64 = 15.0;

/// Частота кадров генератора
pub const FPS: f64 = 25.0;

/// Запас, укорачивающий оценку кадров
const SAFETY_MARGIN: f64 = 0.9;

/// Минимально допустимое число кадров одной генерации
pub const MIN_FRAMES: u32 = 33;

/// Максимально допустимое число кадров одной генерации
pub const MAX_FRAMES: u32 = 81;

/// Потолок кадров потокового режима при неизвестной длительности
const STREAMING_FALLBACK_CEILING: u32 = 1000;

/// Бюджет кадров для одного запуска генератора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget {
    /// Целевое число кадров, `frame_num ≡ 1 (mod 4)`, в пределах [33, 81]
    pub frame_num: u32,
    /// Потолок кадров: равен `frame_num` в режиме клипа,
    /// не меньше `frame_num` в потоковом режиме
    pub max_frames_num: u32,
}

/// Оценить длительность озвучки в секундах; `None` для пустого текста
pub fn estimate_duration(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    Some(text.chars().count() as f64 / CHARS_PER_SECOND)
}

/// Построить бюджет кадров по тексту озвучки и режиму генерации.
///
/// Без оценки длительности выбирается максимум (81): при отсутствии
/// сигнала стоимость генерации ограничивается сверху консервативно.
pub fn plan(text: &str, mode: Mode) -> FrameBudget {
    let duration = estimate_duration(text);

    let frame_num = match duration {
        Some(duration) => {
            let target = (duration * FPS * SAFETY_MARGIN).floor() as u32;
            let clamped = target.clamp(MIN_FRAMES, MAX_FRAMES);
            // Округление вниз до вида 4k+1 с возвратом к нижней границе
            round_down_to_4k1(clamped).max(MIN_FRAMES)
        }
        None => MAX_FRAMES,
    };

    let max_frames_num = match mode {
        Mode::Clip => frame_num,
        Mode::Streaming => match duration {
            Some(duration) => {
                let needed = (duration * FPS).floor() as u32;
                round_up_to_4k1(needed.max(frame_num))
            }
            None => STREAMING_FALLBACK_CEILING,
        },
    };

    FrameBudget {
        frame_num,
        max_frames_num,
    }
}

fn round_down_to_4k1(value: u32) -> u32 {
    if value == 0 {
        return 1;
    }
    value - (value - 1) % 4
}

fn round_up_to_4k1(value: u32) -> u32 {
    if value == 0 {
        return 1;
    }
    let rem = (value - 1) % 4;
    if rem == 0 {
        value
    } else {
        value + (4 - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_text_hits_ceiling() {
        // 150 символов -> 10.0 c -> floor(10 * 25 * 0.9) = 225 -> clamp 81
        let text = "x".repeat(150);
        let budget = plan(&text, Mode::Clip);
        assert_eq!(budget.frame_num, 81);
        assert_eq!(budget.max_frames_num, 81);
    }

    #[test]
    fn test_short_text_in_range() {
        // 30 символов -> 2.0 c -> floor(2 * 25 * 0.9) = 45, уже вида 4k+1
        let text = "x".repeat(30);
        let budget = plan(&text, Mode::Clip);
        assert_eq!(budget.frame_num, 45);
        assert_eq!(budget.max_frames_num, 45);
    }

    #[test]
    fn test_streaming_ceiling_covers_estimate() {
        // 30 символов -> надо floor(2 * 25) = 50 кадров -> вверх до 53
        let text = "x".repeat(30);
        let budget = plan(&text, Mode::Streaming);
        assert_eq!(budget.frame_num, 45);
        assert_eq!(budget.max_frames_num, 53);
        assert!(budget.max_frames_num >= budget.frame_num);
    }

    #[test]
    fn test_empty_text_conservative_default() {
        let budget = plan("", Mode::Streaming);
        assert_eq!(budget.frame_num, MAX_FRAMES);
        assert_eq!(budget.max_frames_num, STREAMING_FALLBACK_CEILING);

        let budget = plan("", Mode::Clip);
        assert_eq!(budget.frame_num, MAX_FRAMES);
        assert_eq!(budget.max_frames_num, MAX_FRAMES);
    }

    #[test]
    fn test_tiny_text_clamps_to_floor() {
        // 1 символ -> floor(1/15 * 25 * 0.9) = 1 -> clamp до 33
        let budget = plan("a", Mode::Clip);
        assert_eq!(budget.frame_num, MIN_FRAMES);
    }

    #[test]
    fn test_invariants_over_lengths() {
        for len in 1..600 {
            let text = "y".repeat(len);
            for mode in [Mode::Streaming, Mode::Clip] {
                let budget = plan(&text, mode);
                assert!(budget.frame_num >= MIN_FRAMES, "len {}", len);
                assert!(budget.frame_num <= MAX_FRAMES, "len {}", len);
                assert_eq!((budget.frame_num - 1) % 4, 0, "len {}", len);
                assert!(budget.max_frames_num >= budget.frame_num, "len {}", len);
                if mode == Mode::Clip {
                    assert_eq!(budget.max_frames_num, budget.frame_num);
                }
            }
        }
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round_down_to_4k1(33), 33);
        assert_eq!(round_down_to_4k1(36), 33);
        assert_eq!(round_down_to_4k1(44), 41);
        assert_eq!(round_up_to_4k1(45), 45);
        assert_eq!(round_up_to_4k1(46), 49);
        assert_eq!(round_up_to_4k1(50), 53);
    }
}
