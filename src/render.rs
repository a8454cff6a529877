//! Turns session state into drawing operations and GeoJSON.
//!
//! The map itself sits behind [`MapSurface`]. Two states are diffed into a
//! list of [`RenderOp`]s so a surface only redraws the layers that changed.

use crate::geo_math::LatLng;
use crate::session::{LayoutMode, MapSessionState, individual_layer_id, optimised_layer_id};
use ahash::AHashMap;
use geojson::{Feature, FeatureCollection, GeoJson, JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Individual,
    Optimised,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Individual => "individual",
            LayerKind::Optimised => "optimised",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub color: String,
    pub kind: LayerKind,
    pub coords: Vec<LatLng>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    Draw(Layer),
    Remove(String),
    Highlight { id: String, on: bool },
}

pub trait MapSurface {
    fn draw_layer(&mut self, layer: &Layer);
    fn remove_layer(&mut self, id: &str);
    fn highlight_layer(&mut self, id: &str, on: bool);
}

pub fn visible_layers(state: &MapSessionState) -> Vec<Layer> {
    match state.mode {
        LayoutMode::Individual => state
            .individual
            .iter()
            .map(|t| Layer {
                id: individual_layer_id(&t.id),
                name: t.id.clone(),
                color: t.color.clone(),
                kind: LayerKind::Individual,
                coords: t.coords.clone(),
            })
            .collect(),
        LayoutMode::Optimised => state
            .optimised
            .iter()
            .map(|r| Layer {
                id: optimised_layer_id(&r.name),
                name: r.name.clone(),
                color: r.color.clone(),
                kind: LayerKind::Optimised,
                coords: r.coords.clone(),
            })
            .collect(),
    }
}

/// Operations that take a surface showing `prev` to one showing `next`.
/// Removals come first, then draws in layer order, then highlight changes.
pub fn plan_render(prev: &MapSessionState, next: &MapSessionState) -> Vec<RenderOp> {
    let before: AHashMap<String, Layer> = visible_layers(prev)
        .into_iter()
        .map(|l| (l.id.clone(), l))
        .collect();
    let after = visible_layers(next);
    let after_ids: AHashMap<&str, &Layer> = after.iter().map(|l| (l.id.as_str(), l)).collect();

    let mut ops = Vec::new();

    let mut stale: Vec<&String> = before
        .iter()
        .filter(|(id, layer)| after_ids.get(id.as_str()).is_none_or(|l| *l != *layer))
        .map(|(id, _)| id)
        .collect();
    stale.sort();
    ops.extend(stale.into_iter().map(|id| RenderOp::Remove(id.clone())));

    for layer in &after {
        if before.get(&layer.id) != Some(layer) {
            ops.push(RenderOp::Draw(layer.clone()));
        }
    }

    let redrawn = |id: &str| ops.iter().any(|op| matches!(op, RenderOp::Draw(l) if l.id == id));
    let mut highlight_ops = Vec::new();
    if prev.selected != next.selected {
        if let Some(id) = &prev.selected {
            if after_ids.contains_key(id.as_str()) && !redrawn(id) {
                highlight_ops.push(RenderOp::Highlight { id: id.clone(), on: false });
            }
        }
    }
    if let Some(id) = &next.selected {
        if after_ids.contains_key(id.as_str()) && (prev.selected != next.selected || redrawn(id)) {
            highlight_ops.push(RenderOp::Highlight { id: id.clone(), on: true });
        }
    }
    ops.extend(highlight_ops);
    ops
}

pub fn apply_ops<M: MapSurface>(surface: &mut M, ops: &[RenderOp]) {
    for op in ops {
        match op {
            RenderOp::Draw(layer) => surface.draw_layer(layer),
            RenderOp::Remove(id) => surface.remove_layer(id),
            RenderOp::Highlight { id, on } => surface.highlight_layer(id, *on),
        }
    }
}

fn layer_feature(layer: &Layer) -> Feature {
    let line: Vec<Vec<f64>> = layer.coords.iter().map(|p| p.to_lng_lat().to_vec()).collect();

    let mut properties = serde_json::Map::new();
    properties.insert(String::from("id"), JsonValue::String(layer.id.clone()));
    properties.insert(String::from("name"), JsonValue::String(layer.name.clone()));
    properties.insert(String::from("color"), JsonValue::String(layer.color.clone()));
    properties.insert(String::from("kind"), JsonValue::String(layer.kind.as_str().to_string()));

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry {
            bbox: None,
            value: geojson::Value::LineString(line),
            foreign_members: None,
        }),
        id: Some(geojson::feature::Id::String(layer.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn to_feature_collection(layers: &[Layer]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: layers.iter().map(layer_feature).collect(),
        foreign_members: None,
    }
}

pub fn to_geojson_string(state: &MapSessionState) -> String {
    GeoJson::from(to_feature_collection(&visible_layers(state))).to_string()
}
