// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Python bootstrap code surrounding emitted archives.

The epilogue installs a meta path finder resolving modules from the archive
registry, so artifacts run on a stock Python interpreter.
*/

use {
    handlebars::Handlebars,
    once_cell::sync::Lazy,
    pyinline_archive::{Archive, ArchiveError, ArchiveResult, BootstrapTemplate},
    serde::Serialize,
};

static HANDLEBARS: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string(
            "bootstrap-prologue.py",
            include_str!("templates/bootstrap-prologue.py.hbs"),
        )
        .expect("prologue template is valid");
    handlebars
        .register_template_string(
            "bootstrap-epilogue.py",
            include_str!("templates/bootstrap-epilogue.py.hbs"),
        )
        .expect("epilogue template is valid");

    handlebars
});

#[derive(Serialize)]
struct TemplateData<'a> {
    version: &'static str,
    packages: String,
    default_package: Option<&'a str>,
}

/// Renders the bootstrap of the Python meta path finder.
#[derive(Clone, Debug, Default)]
pub struct PythonBootstrap {
    packages: Vec<String>,
}

impl PythonBootstrap {
    /// Construct for the named inlined packages.
    ///
    /// Package names only appear in the generated header.
    pub fn new(packages: Vec<String>) -> Self {
        Self { packages }
    }

    fn render(&self, template: &str, archive: &Archive) -> ArchiveResult<String> {
        let data = TemplateData {
            version: env!("CARGO_PKG_VERSION"),
            packages: self.packages.join(", "),
            default_package: archive.default_package.as_deref(),
        };

        HANDLEBARS
            .render(template, &data)
            .map_err(|e| ArchiveError::Bootstrap(e.to_string()))
    }
}

impl BootstrapTemplate for PythonBootstrap {
    fn render_prologue(&self, archive: &Archive) -> ArchiveResult<String> {
        self.render("bootstrap-prologue.py", archive)
    }

    fn render_epilogue(&self, archive: &Archive) -> ArchiveResult<String> {
        self.render("bootstrap-epilogue.py", archive)
    }
}
