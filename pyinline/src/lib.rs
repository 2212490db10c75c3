// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Inline Python packages into a single source file.

The packer walks one or more package directories, encodes every module
source into a blob and writes a Python file that carries the blob, a
registry of module locations and a bootstrap installing an importer for
them. Importing or running that file behaves like importing the original
packages.

This library exposes the functionality of the `pyinline` executable.
*/

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod packing;
