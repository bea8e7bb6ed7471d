//! Structural sanity checks on raw window records

use crate::macos::core_graphics::{Bounds, RawWindow};
use thiserror::Error;

pub const MIN_LAYER: i32 = -1000;
pub const MAX_LAYER: i32 = 1000;

/// Why a raw record never reaches filtering
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("window id must be positive")]
    MissingWindowId,
    #[error("owner pid {0} must be positive")]
    InvalidOwner(i32),
    #[error("window has no bounds")]
    MissingBounds,
    #[error("window has empty bounds")]
    EmptyBounds,
    #[error("alpha {0} is outside [0, 1]")]
    AlphaOutOfRange(f64),
    #[error("layer {0} is outside [{MIN_LAYER}, {MAX_LAYER}]")]
    LayerOutOfRange(i32),
}

/// A raw record that passed validation, with its optional fields settled
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedWindow {
    pub window_id: u32,
    pub owner_pid: i32,
    pub owner_name: Option<String>,
    pub title: Option<String>,
    pub bounds: Bounds,
    pub alpha: f64,
    pub layer: i32,
    pub is_on_screen: bool,
}

/// Accept a raw record only if it is structurally sound
pub fn validate(raw: RawWindow) -> Result<CheckedWindow, Rejection> {
    if raw.window_id == 0 {
        return Err(Rejection::MissingWindowId);
    }
    if raw.owner_pid <= 0 {
        return Err(Rejection::InvalidOwner(raw.owner_pid));
    }

    let bounds = raw.bounds.ok_or(Rejection::MissingBounds)?;
    if !(bounds.width > 0.0 && bounds.height > 0.0) {
        return Err(Rejection::EmptyBounds);
    }

    if let Some(alpha) = raw.alpha {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Rejection::AlphaOutOfRange(alpha));
        }
    }
    if let Some(layer) = raw.layer {
        if !(MIN_LAYER..=MAX_LAYER).contains(&layer) {
            return Err(Rejection::LayerOutOfRange(layer));
        }
    }

    Ok(CheckedWindow {
        window_id: raw.window_id,
        owner_pid: raw.owner_pid,
        owner_name: raw.owner_name,
        title: raw.title,
        bounds,
        alpha: raw.alpha.unwrap_or(1.0),
        layer: raw.layer.unwrap_or(0),
        is_on_screen: raw.is_on_screen,
    })
}
