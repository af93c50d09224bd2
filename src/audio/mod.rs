// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Audio engine - periodic mixing of tone sources on an interruptible thread.

pub mod buffer;
pub mod level;
pub mod manager;
pub mod object;
pub mod scheduler;
pub mod sine;

pub use level::linear_to_db;
pub use manager::AudioManager;
