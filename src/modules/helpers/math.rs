pub struct Math {}

impl Math {
    /// mean of the values, `None` for an empty slice
    pub fn mean(nums: &[f64]) -> Option<f64> {
        if nums.is_empty() {
            return None;
        }

        let sum: f64 = nums.iter().sum();
        Some(sum / nums.len() as f64)
    }

    /// population standard deviation, `None` for an empty slice
    pub fn standard_deviation(nums: &[f64]) -> Option<f64> {
        let mean = Math::mean(nums)?;
        let mut sum = 0.0;
        for num in nums {
            sum += (num - mean).powi(2);
        }

        Some((sum / nums.len() as f64).sqrt())
    }

    /// # consistency of a set of lap times
    /// the standard deviation of the lap times. with more than 3 laps the two
    /// slowest laps are dropped first.
    ///
    /// ## Returns
    /// * `Option<f64>` - `None` without laps, `0.0` for a single lap
    pub fn consistency(lap_times: &[f64]) -> Option<f64> {
        match lap_times.len() {
            0 => None,
            1 => Some(0.0),
            2 | 3 => Math::standard_deviation(lap_times),
            _ => {
                let mut sorted = lap_times.to_vec();
                sorted.sort_by(f64::total_cmp);
                sorted.truncate(sorted.len() - 2);
                Math::standard_deviation(&sorted)
            }
        }
    }
}
