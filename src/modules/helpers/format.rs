/// # format a lap time
/// format a time in seconds as `M:SS.mmm`, or `N/A` when there is no time
///
/// ## Arguments
/// * `time_seconds` - the time to format
pub fn format_lap_time(time_seconds: Option<f64>) -> String {
    match time_seconds {
        Some(time) if time.is_finite() && time >= 0.0 => {
            let total_millis = (time * 1000.0).round() as u64;
            let minutes = total_millis / 60_000;
            let millis = total_millis % 60_000;
            format!("{}:{:02}.{:03}", minutes, millis / 1000, millis % 1000)
        }
        _ => "N/A".to_string(),
    }
}
