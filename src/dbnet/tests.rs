/*
 * Created on Wed Feb 21 2024
 *
 * This file is a part of qmd
 * qmd is the query manager that fronts the game world, login and web
 * services with a typed query protocol over a shared SQL store.
 *
 * Copyright (c) 2024, The qmd developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    super::{NetBackoff, Terminator},
    tokio::sync::broadcast,
};

#[test]
fn backoff_starts_patient() {
    let backoff = NetBackoff::new();
    assert!(!backoff.should_disconnect());
}

#[tokio::test]
async fn terminator_fires_on_signal() {
    let (tx, rx) = broadcast::channel(1);
    let mut term = Terminator::new(rx);
    tx.send(()).unwrap();
    term.receive_signal().await;
}

#[tokio::test]
async fn terminator_fires_when_senders_are_gone() {
    let (tx, rx) = broadcast::channel::<()>(1);
    let mut term = Terminator::new(rx);
    drop(tx);
    term.receive_signal().await;
}
