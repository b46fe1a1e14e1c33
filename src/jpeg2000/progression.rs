//! Packet progression orders (ISO/IEC 15444-1 B.12).
//!
//! A progression yields `(layer, resolution, component, precinct)` tuples in the order
//! their packets appear in the codestream.

use crate::error::J2kError;
use crate::jpeg2000::image::Tile;
use num_enum::TryFromPrimitive;
use std::cmp::Ordering;

/// Progression order as carried in the COD marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ProgressionOrder {
    /// Layer-Resolution-Component-Position.
    Lrcp = 0,
    /// Resolution-Layer-Component-Position.
    Rlcp = 1,
    /// Resolution-Position-Component-Layer.
    Rpcl = 2,
    /// Position-Component-Resolution-Layer.
    Pcrl = 3,
    /// Component-Position-Resolution-Layer.
    Cprl = 4,
}

impl Default for ProgressionOrder {
    fn default() -> Self {
        Self::Lrcp
    }
}

impl ProgressionOrder {
    pub fn from_u8(value: u8) -> Result<Self, J2kError> {
        Self::try_from(value).map_err(|_| J2kError::InvalidProgressionOrder)
    }
}

impl std::str::FromStr for ProgressionOrder {
    type Err = J2kError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LRCP" => Ok(Self::Lrcp),
            "RLCP" => Ok(Self::Rlcp),
            "RPCL" => Ok(Self::Rpcl),
            "PCRL" => Ok(Self::Pcrl),
            "CPRL" => Ok(Self::Cprl),
            _ => Err(J2kError::InvalidProgressionOrder),
        }
    }
}

/// Address of one packet inside a tile.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct PacketId {
    pub layer: usize,
    pub resolution: usize,
    pub component: usize,
    pub precinct: usize,
}

fn num_precincts(tile: &Tile, component: usize, resolution: usize) -> usize {
    tile.components[component]
        .resolutions
        .get(resolution)
        .map_or(0, |r| r.num_precincts())
}

fn max_resolutions(tile: &Tile) -> usize {
    tile.components.iter().map(|c| c.resolutions.len()).max().unwrap_or(0)
}

/// B.12.1.1 Layer-resolution level-component-position progression.
fn layer_resolution_component_position(tile: &Tile) -> Vec<PacketId> {
    let mut packets = Vec::new();
    for layer in 0..tile.num_layers {
        for resolution in 0..max_resolutions(tile) {
            for component in 0..tile.components.len() {
                for precinct in 0..num_precincts(tile, component, resolution) {
                    packets.push(PacketId {
                        layer,
                        resolution,
                        component,
                        precinct,
                    });
                }
            }
        }
    }
    packets
}

/// B.12.1.2 Resolution level-layer-component-position progression.
fn resolution_layer_component_position(tile: &Tile) -> Vec<PacketId> {
    let mut packets = Vec::new();
    for resolution in 0..max_resolutions(tile) {
        for layer in 0..tile.num_layers {
            for component in 0..tile.components.len() {
                for precinct in 0..num_precincts(tile, component, resolution) {
                    packets.push(PacketId {
                        layer,
                        resolution,
                        component,
                        precinct,
                    });
                }
            }
        }
    }
    packets
}

// The three position-driven orders list every precinct of every component and
// resolution, sort them by a key that differs per order, then emit all layers of each.

struct PrecinctStore {
    resolution: usize,
    precinct_y: u32,
    precinct_x: u32,
    component: usize,
    precinct: usize,
}

fn position_progression_common(
    tile: &Tile,
    sort: impl FnMut(&PrecinctStore, &PrecinctStore) -> Ordering,
) -> Vec<PacketId> {
    let mut elements = vec![];
    for (component, tile_component) in tile.components.iter().enumerate() {
        for (resolution, res) in tile_component.resolutions.iter().enumerate() {
            elements.extend((0..res.num_precincts()).map(|precinct| {
                let (precinct_x, precinct_y) =
                    res.precinct_origins.get(precinct).copied().unwrap_or((0, 0));
                PrecinctStore {
                    resolution,
                    precinct_y,
                    precinct_x,
                    component,
                    precinct,
                }
            }));
        }
    }

    elements.sort_by(sort);

    elements
        .into_iter()
        .flat_map(|e| {
            (0..tile.num_layers).map(move |layer| PacketId {
                layer,
                resolution: e.resolution,
                component: e.component,
                precinct: e.precinct,
            })
        })
        .collect()
}

/// B.12.1.3 Resolution level-position-component-layer progression.
fn resolution_position_component_layer(tile: &Tile) -> Vec<PacketId> {
    position_progression_common(tile, |p, s| {
        p.resolution
            .cmp(&s.resolution)
            .then_with(|| p.precinct_y.cmp(&s.precinct_y))
            .then_with(|| p.precinct_x.cmp(&s.precinct_x))
            .then_with(|| p.component.cmp(&s.component))
            .then_with(|| p.precinct.cmp(&s.precinct))
    })
}

/// B.12.1.4 Position-component-resolution level-layer progression.
fn position_component_resolution_layer(tile: &Tile) -> Vec<PacketId> {
    position_progression_common(tile, |p, s| {
        p.precinct_y
            .cmp(&s.precinct_y)
            .then_with(|| p.precinct_x.cmp(&s.precinct_x))
            .then_with(|| p.component.cmp(&s.component))
            .then_with(|| p.resolution.cmp(&s.resolution))
            .then_with(|| p.precinct.cmp(&s.precinct))
    })
}

/// B.12.1.5 Component-position-resolution level-layer progression.
fn component_position_resolution_layer(tile: &Tile) -> Vec<PacketId> {
    position_progression_common(tile, |p, s| {
        p.component
            .cmp(&s.component)
            .then_with(|| p.precinct_y.cmp(&s.precinct_y))
            .then_with(|| p.precinct_x.cmp(&s.precinct_x))
            .then_with(|| p.resolution.cmp(&s.resolution))
            .then_with(|| p.precinct.cmp(&s.precinct))
    })
}

/// Every packet of the tile in the order of `tile.progression`.
pub fn packet_order(tile: &Tile) -> Vec<PacketId> {
    match tile.progression {
        ProgressionOrder::Lrcp => layer_resolution_component_position(tile),
        ProgressionOrder::Rlcp => resolution_layer_component_position(tile),
        ProgressionOrder::Rpcl => resolution_position_component_layer(tile),
        ProgressionOrder::Pcrl => position_component_resolution_layer(tile),
        ProgressionOrder::Cprl => component_position_resolution_layer(tile),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding_parameters::CodeBlockStyle;
    use crate::jpeg2000::image::{Resolution, TileComponent};

    fn tile(progression: ProgressionOrder) -> Tile {
        // component 0: two resolutions, the second with 2x1 precincts
        // component 1: one resolution
        let c0 = TileComponent::new(
            vec![Resolution::new(1, 1, Vec::new()), Resolution::new(2, 1, Vec::new())],
            CodeBlockStyle::default(),
        );
        let c1 = TileComponent::new(
            vec![Resolution::new(1, 1, Vec::new())],
            CodeBlockStyle::default(),
        );
        Tile::new(vec![c0, c1], 2, progression)
    }

    fn tuples(packets: &[PacketId]) -> Vec<(usize, usize, usize, usize)> {
        packets
            .iter()
            .map(|p| (p.layer, p.resolution, p.component, p.precinct))
            .collect()
    }

    #[test]
    fn test_progression_order_from_u8() {
        assert_eq!(ProgressionOrder::from_u8(2), Ok(ProgressionOrder::Rpcl));
        assert_eq!(ProgressionOrder::from_u8(5), Err(J2kError::InvalidProgressionOrder));
        assert_eq!("cprl".parse::<ProgressionOrder>(), Ok(ProgressionOrder::Cprl));
    }

    #[test]
    fn test_lrcp() {
        let packets = packet_order(&tile(ProgressionOrder::Lrcp));
        assert_eq!(
            tuples(&packets),
            vec![
                (0, 0, 0, 0),
                (0, 0, 1, 0),
                (0, 1, 0, 0),
                (0, 1, 0, 1),
                (1, 0, 0, 0),
                (1, 0, 1, 0),
                (1, 1, 0, 0),
                (1, 1, 0, 1),
            ]
        );
    }

    #[test]
    fn test_rlcp() {
        let packets = packet_order(&tile(ProgressionOrder::Rlcp));
        assert_eq!(
            tuples(&packets),
            vec![
                (0, 0, 0, 0),
                (0, 0, 1, 0),
                (1, 0, 0, 0),
                (1, 0, 1, 0),
                (0, 1, 0, 0),
                (0, 1, 0, 1),
                (1, 1, 0, 0),
                (1, 1, 0, 1),
            ]
        );
    }

    #[test]
    fn test_rpcl_layers_innermost() {
        let packets = packet_order(&tile(ProgressionOrder::Rpcl));
        assert_eq!(
            tuples(&packets),
            vec![
                (0, 0, 0, 0),
                (1, 0, 0, 0),
                (0, 0, 1, 0),
                (1, 0, 1, 0),
                (0, 1, 0, 0),
                (1, 1, 0, 0),
                (0, 1, 0, 1),
                (1, 1, 0, 1),
            ]
        );
    }

    #[test]
    fn test_pcrl_and_cprl() {
        let packets = packet_order(&tile(ProgressionOrder::Pcrl));
        assert_eq!(
            tuples(&packets)
                .iter()
                .step_by(2)
                .map(|&(_, r, c, p)| (r, c, p))
                .collect::<Vec<_>>(),
            vec![(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 0, 1)]
        );

        let packets = packet_order(&tile(ProgressionOrder::Cprl));
        assert_eq!(
            tuples(&packets)
                .iter()
                .step_by(2)
                .map(|&(_, r, c, p)| (r, c, p))
                .collect::<Vec<_>>(),
            vec![(0, 0, 0), (1, 0, 0), (1, 0, 1), (0, 1, 0)]
        );
    }

    #[test]
    fn test_every_order_visits_each_packet_once() {
        for order in 0u8..5 {
            let tile = tile(ProgressionOrder::from_u8(order).unwrap());
            let mut packets = tuples(&packet_order(&tile));
            assert_eq!(packets.len(), 8);
            packets.sort();
            packets.dedup();
            assert_eq!(packets.len(), 8);
        }
    }
}
