//! Deterministic node identity. Two pipes that discover the same physical
//! point must converge on the same node key without coordinating, so the key
//! is a pure function of the point's rounded coordinates plus a small
//! discriminator separating the kinds of node that can share a coordinate.

use geo_types::Point;

/// Coordinates are rounded to 3 decimal places (millimetres on EPSG:27700)
/// before encoding.
const COORD_SCALE: f64 = 1000.0;

/// Discriminator for junction nodes.
pub const JUNCTION_DISCRIMINATOR: i64 = 0;
/// Discriminator for pipe-end nodes.
pub const PIPE_END_DISCRIMINATOR: i64 = 1;
/// Asset nodes use `ASSET_DISCRIMINATOR_BASE + asset_type_index` so they can
/// never collide with a junction or end node at the same coordinates, and
/// different asset types at one coordinate stay distinct.
pub const ASSET_DISCRIMINATOR_BASE: i64 = 2;

/// Integer representation of a coordinate: round to 3 decimal places, then
/// drop the decimal point. `52.123` and `52.1234` map to the same value;
/// anything further apart than a millimetre does not.
fn coord_repr(value: f64) -> i64 {
    (value * COORD_SCALE).round() as i64
}

/// Encode a point plus discriminators into a short stable identifier.
///
/// The integer sequence `[x_repr, y_repr, *discriminators]` is hashed with
/// seahash and rendered as fixed-width hex. Only determinism and collision
/// resistance matter here; the key is never decoded.
pub fn encode_node_key(point: &Point<f64>, discriminators: &[i64]) -> String {
    let mut bytes = Vec::with_capacity(8 * (2 + discriminators.len()));
    for part in [coord_repr(point.x()), coord_repr(point.y())]
        .iter()
        .chain(discriminators.iter())
    {
        bytes.extend_from_slice(&part.to_le_bytes());
    }

    format!("{:016x}", seahash::hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_input_same_key() {
        let p = Point::new(431_250.123, 278_990.456);
        assert_eq!(
            encode_node_key(&p, &[JUNCTION_DISCRIMINATOR]),
            encode_node_key(&p, &[JUNCTION_DISCRIMINATOR])
        );
    }

    #[test]
    fn test_sub_millimetre_difference_is_the_same_point() {
        let a = Point::new(431_250.1230, 278_990.4560);
        let b = Point::new(431_250.12304, 278_990.45596);
        assert_eq!(
            encode_node_key(&a, &[JUNCTION_DISCRIMINATOR]),
            encode_node_key(&b, &[JUNCTION_DISCRIMINATOR])
        );
    }

    #[test]
    fn test_discriminators_separate_cohabiting_nodes() {
        let p = Point::new(431_250.123, 278_990.456);
        let junction = encode_node_key(&p, &[JUNCTION_DISCRIMINATOR]);
        let end = encode_node_key(&p, &[PIPE_END_DISCRIMINATOR]);
        let hydrant = encode_node_key(&p, &[ASSET_DISCRIMINATOR_BASE + 4]);
        let logger = encode_node_key(&p, &[ASSET_DISCRIMINATOR_BASE + 5]);

        assert_ne!(junction, end);
        assert_ne!(junction, hydrant);
        assert_ne!(hydrant, logger);
    }

    #[test]
    fn test_different_points_get_different_keys() {
        let a = Point::new(431_250.123, 278_990.456);
        let b = Point::new(431_250.124, 278_990.456);
        assert_ne!(
            encode_node_key(&a, &[JUNCTION_DISCRIMINATOR]),
            encode_node_key(&b, &[JUNCTION_DISCRIMINATOR])
        );
    }

    #[test]
    fn test_negative_coordinates_round_cleanly() {
        let a = Point::new(-1.5, -2.25);
        let b = Point::new(-1.4996, -2.2504);
        assert_eq!(
            encode_node_key(&a, &[JUNCTION_DISCRIMINATOR]),
            encode_node_key(&b, &[JUNCTION_DISCRIMINATOR])
        );
    }
}
