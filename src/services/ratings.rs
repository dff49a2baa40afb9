use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::database::manager::DatabaseError;

/// Rating shown for a tour nobody has reviewed yet.
pub const DEFAULT_RATING: f64 = 4.5;

/// Recompute a tour's rating statistics from the full current set of its
/// reviews. Called synchronously from every review mutation so a subsequent
/// read of the tour reflects the change; concurrent writers converge because
/// each one recomputes from scratch.
pub async fn recompute_tour_ratings(pool: &PgPool, tour_id: Uuid) -> Result<(), DatabaseError> {
    let stats = sqlx::query(
        "SELECT COUNT(*) AS quantity, AVG(rating::float8) AS average \
         FROM reviews WHERE tour_id = $1",
    )
    .bind(tour_id)
    .fetch_one(pool)
    .await?;

    let quantity: i64 = stats.try_get("quantity")?;
    let average: Option<f64> = stats.try_get("average")?;

    let (quantity, average) = match average {
        Some(mean) => (quantity, round_to_tenth(mean)),
        // Zero reviews resets to defaults rather than leaving stale values.
        None => (0, DEFAULT_RATING),
    };

    sqlx::query("UPDATE tours SET ratings_quantity = $1, ratings_average = $2 WHERE id = $3")
        .bind(i32::try_from(quantity).unwrap_or(i32::MAX))
        .bind(average)
        .bind(tour_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Ratings are stored rounded to one decimal.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_one_decimal() {
        assert_eq!(round_to_tenth(4.666666), 4.7);
        assert_eq!(round_to_tenth(4.649), 4.6);
        assert_eq!(round_to_tenth(3.0), 3.0);
        // mean of ratings 4 and 5
        assert_eq!(round_to_tenth(4.5), 4.5);
    }

    #[test]
    fn default_rating_matches_fresh_tours() {
        assert_eq!(DEFAULT_RATING, 4.5);
    }
}
