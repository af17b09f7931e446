use anyhow::Result;
use itertools::Itertools;

use film_archive::archive::{ArchiveConfig, Config};

use crate::FilmSortArgs;

/// Combine command line arguments with the user config file.
///
/// Scalar arguments override the file, flags are OR-ed and ignore patterns are merged.
/// Extensions given on the command line replace the configured allow-list.
pub(crate) fn build_config(args: FilmSortArgs, mut user_config: ArchiveConfig) -> Result<Config> {
    let source = film_archive::resolve_input_path(args.source.as_deref())?;

    user_config.destination = args.destination.or(user_config.destination);
    user_config.registry = args.registry.or(user_config.registry);
    user_config.alternate_titles = args.titles.or(user_config.alternate_titles);
    user_config.cache = args.cache.or(user_config.cache);
    user_config.log = args.log.or(user_config.log);
    user_config.report = args.report.or(user_config.report);
    user_config.batch_size = args.batch_size.or(user_config.batch_size);
    if !args.extension.is_empty() {
        user_config.extensions = args.extension;
    }
    user_config.ignore_patterns = args
        .ignore
        .into_iter()
        .chain(user_config.ignore_patterns)
        .unique()
        .collect();
    user_config.ai.enabled = args.ai || user_config.ai.enabled;
    user_config.debug = args.debug || user_config.debug;
    user_config.dryrun = args.print || user_config.dryrun;
    user_config.verbose = args.verbose || user_config.verbose || user_config.debug;

    Config::from_user_config(source, user_config)
}
