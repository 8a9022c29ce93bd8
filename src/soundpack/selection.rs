// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::sync::Arc;

use parking_lot::RwLock;

/// The shared pointer to the currently selected sound pack. At most one pack is
/// selected at a time.
#[derive(Clone, Debug, Default)]
pub struct ActiveSoundPackSelection {
    current: Arc<RwLock<Option<String>>>,
}

impl ActiveSoundPackSelection {
    /// Creates an empty selection.
    pub fn new() -> ActiveSoundPackSelection {
        ActiveSoundPackSelection::default()
    }

    /// Gets the selected pack id.
    pub fn get(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Selects the given pack, returning the previous selection.
    pub fn select(&self, id: &str) -> Option<String> {
        self.current.write().replace(id.to_string())
    }

    /// Clears the selection, returning the previous selection.
    pub fn clear(&self) -> Option<String> {
        self.current.write().take()
    }

    /// Clears the selection only if it points at the given id.
    pub fn clear_if(&self, id: &str) -> bool {
        let mut current = self.current.write();
        if current.as_deref() == Some(id) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.current.read().as_deref() == Some(id)
    }
}
