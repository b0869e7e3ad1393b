use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser};

use scrape_html::logger::{self, Verbosity};
use scrape_html::{Cli, Invocation, ScrapeError};

fn main() -> anyhow::Result<()> {
    let cli = Cli::try_parse().unwrap_or_else(|mut err| {
        // value errors are rendered without the usage line otherwise
        if err.use_stderr() {
            let usage = Cli::command().render_usage();
            err.insert(ContextKind::Usage, ContextValue::StyledStr(usage));
        }
        err.exit()
    });
    logger::init(Verbosity::from(cli.verbose));

    let invocation = match Invocation::resolve(cli) {
        Ok(invocation) => invocation,
        Err(err) if err.is_usage() => {
            let kind = match err {
                ScrapeError::Usage(_) => ErrorKind::Io,
                _ => ErrorKind::ValueValidation,
            };
            Cli::command().error(kind, err).exit()
        }
        Err(err) => return Err(err.into()),
    };

    scrape_html::run(invocation, std::io::stdout().lock())?;
    Ok(())
}
