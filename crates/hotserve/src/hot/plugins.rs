use super::HotOptions;
use crate::build::{BuildPlugin, Compiler};

/// Inject the hot reload plugins into every target of `compiler`.
///
/// Each target gets HMR and the client entry; the progress reporter is
/// applied once to the root compiler so multi-target builds report a single
/// stream.
pub fn apply(compiler: &dyn Compiler, options: &HotOptions) {
    for (index, target) in compiler.targets().into_iter().enumerate() {
        compiler.apply_plugin(Some(index), BuildPlugin::HotModuleReplacement);
        compiler.apply_plugin(
            Some(index),
            BuildPlugin::Entry {
                request: options.client_request(target.name.as_deref()),
                context: target.context,
            },
        );
    }

    if options.progress {
        compiler.apply_plugin(None, BuildPlugin::Progress);
    }
}
