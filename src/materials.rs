use crate::errors::NetworkError;

/// How far along a pipe of the given material an acoustic logger can hear
/// leak noise, in metres. Metallic and rigid materials carry sound roughly
/// twice as far as plastics.
pub fn detection_distance(material: &str) -> Result<f64, NetworkError> {
    let distance = match material {
        "Steel" | "Ductile Iron" | "Unknown" | "Cast Iron" | "Concrete" | "Stainless Steel"
        | "Concrete Steel" | "Other" | "Copper" | "Galvanized Iron" | "Aluminium"
        | "Polyethylene Aluminium Composite" | "Lead" | "Steel High Pressure Polyethylene"
        | "None" => 150.0,
        "Medium Density Polyethylene"
        | "High Performance Polyethylene"
        | "Polyolefin"
        | "Glass Reinforced Plastic"
        | "Unplasticized Polyvinyl Chloride"
        | "Asbestos Cement"
        | "Mild Steel Epoxy Coated"
        | "Low Density Polyethylene"
        | "Bituminous"
        | "Polyvinyl Chloride"
        | "Brick"
        | "Fiberglass"
        | "Plastic"
        | "Glass"
        | "High Density Polyethylene"
        | "Polyethylene"
        | "Polyurethane"
        | "Vinyl Chloride"
        | "Polypropylene"
        | "Marble" => 70.0,
        other => {
            return Err(NetworkError::UnknownMaterial {
                material: other.to_string(),
            });
        }
    };

    Ok(distance)
}

/// Fixed ordering of point-asset type names. The index of an asset's type in
/// this list is part of its node-key discriminator, so the order must never
/// be changed once a graph has been persisted.
pub const POINT_ASSET_ORDER: &[&str] = &[
    "chamber",
    "connection_meter",
    "consumption_meter",
    "flow_control",
    "hydrant",
    "logger",
    "meter",
    "network_meter",
    "network_opt_valve",
    "operational_site",
    "pressure_control_valve",
    "pressure_fitting",
    "water_pump",
    "water_tank",
    "water_work",
];

pub fn asset_type_index(asset_name: &str) -> Result<i64, NetworkError> {
    POINT_ASSET_ORDER
        .iter()
        .position(|name| *name == asset_name)
        .map(|idx| idx as i64)
        .ok_or_else(|| NetworkError::UnknownAssetType {
            asset_name: asset_name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metallic_vs_plastic_distances() {
        assert_eq!(detection_distance("Steel").unwrap(), 150.0);
        assert_eq!(detection_distance("Cast Iron").unwrap(), 150.0);
        assert_eq!(detection_distance("Plastic").unwrap(), 70.0);
        assert_eq!(detection_distance("Polyethylene").unwrap(), 70.0);
    }

    #[test]
    fn test_unknown_material_is_an_error() {
        let err = detection_distance("Adamantium").unwrap_err();
        assert!(matches!(err, NetworkError::UnknownMaterial { .. }));
    }

    #[test]
    fn test_asset_type_index_is_stable() {
        assert_eq!(asset_type_index("chamber").unwrap(), 0);
        assert_eq!(asset_type_index("hydrant").unwrap(), 4);
        assert_eq!(asset_type_index("logger").unwrap(), 5);
        assert_eq!(asset_type_index("water_work").unwrap(), 14);
    }

    #[test]
    fn test_unknown_asset_type_is_an_error() {
        assert!(matches!(
            asset_type_index("submarine"),
            Err(NetworkError::UnknownAssetType { .. })
        ));
    }
}
