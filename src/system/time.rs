use biosense::Millis;
use embassy_time::Instant;

/// Milliseconds since boot, truncated to the 32-bit counter the
/// measurement core works with
pub fn now_ms() -> Millis {
    Instant::now().as_millis() as Millis
}
