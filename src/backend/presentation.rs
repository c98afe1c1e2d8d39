/*!
 * Presentation
 * How a unit is shown: in place, in a popup window, or embedded in a region
 */

use super::launch::Environment;
use crate::core::config::{EmbedDefaults, PopupDefaults};
use crate::core::limits::{
    ENV_EMBED_HEIGHT, ENV_EMBED_WIDTH, ENV_POPUP_HEIGHT, ENV_POPUP_WIDTH, ENV_SPAWN_EMBED_VALUE,
    ENV_SPAWN_MODE, ENV_SPAWN_POPUP_VALUE,
};
use crate::core::types::UnitHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Presentation mode of a spawned unit. Exactly one per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Presentation {
    /// Embedded in the current view at zero size
    Inline,
    /// Separate window
    Popup { width: u32, height: u32, title: String },
    /// Occupies a region of the current view
    Embedded { width: String, height: String },
}

impl Presentation {
    /// Select the mode from the unit's environment hints
    pub fn from_env(
        env: &Environment,
        title: &str,
        popup: &PopupDefaults,
        embed: &EmbedDefaults,
    ) -> Self {
        match env.get(ENV_SPAWN_MODE) {
            Some(ENV_SPAWN_POPUP_VALUE) => Presentation::Popup {
                width: parse_dimension(env.get(ENV_POPUP_WIDTH), popup.width),
                height: parse_dimension(env.get(ENV_POPUP_HEIGHT), popup.height),
                title: title.to_string(),
            },
            Some(ENV_SPAWN_EMBED_VALUE) => Presentation::Embedded {
                width: non_empty(env.get(ENV_EMBED_WIDTH))
                    .unwrap_or(embed.width.as_str())
                    .to_string(),
                height: non_empty(env.get(ENV_EMBED_HEIGHT))
                    .unwrap_or(embed.height.as_str())
                    .to_string(),
            },
            _ => Presentation::Inline,
        }
    }

    pub fn is_popup(&self) -> bool {
        matches!(self, Presentation::Popup { .. })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Leading-digits parse; zero or garbage falls back to the default
fn parse_dimension(value: Option<&str>, default: u32) -> u32 {
    value
        .map(str::trim)
        .map(|v| {
            let digits: String = v.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().unwrap_or(0)
        })
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// The view layer the kernel attaches units to
pub trait Presenter: Send {
    /// Place the unit in its presentation
    fn attach(&mut self, handle: UnitHandle, presentation: &Presentation);

    /// Remove the unit from layout and destroy any popup it owns
    fn detach(&mut self, handle: UnitHandle, presentation: &Presentation);
}

/// Presenter without a view; tracks what is currently attached
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    attached: BTreeMap<UnitHandle, Presentation>,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(&self) -> &BTreeMap<UnitHandle, Presentation> {
        &self.attached
    }
}

impl Presenter for HeadlessPresenter {
    fn attach(&mut self, handle: UnitHandle, presentation: &Presentation) {
        debug!(%handle, ?presentation, "Attached unit");
        self.attached.insert(handle, presentation.clone());
    }

    fn detach(&mut self, handle: UnitHandle, presentation: &Presentation) {
        if self.attached.remove(&handle).is_some() && presentation.is_popup() {
            debug!(%handle, "Destroyed popup");
        }
    }
}
