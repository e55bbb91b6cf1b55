#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate serde_json;
extern crate covdb;
extern crate env_logger;

use covdb::{ProjectSummary, Result, UpdatableRegFile};

use std::env;
use std::io::stdout;
use std::path::PathBuf;

quick_main!(run);

fn run() -> Result<()> {
    env_logger::init();

    let path = PathBuf::from(env::args_os().nth(1).expect("filename"));
    let registry = UpdatableRegFile::open(&path)?;
    let dumped = registry.read_contents(|contents| {
        let mut sessions = Vec::new();
        for session in contents.sessions()? {
            let mut files = Vec::new();
            for record in session.file_infos() {
                files.push(serde_json::to_value(record.file_info()?)?);
            }
            sessions.push(json!({
                "location": session.location(),
                "version": session.version(),
                "start_ts": session.start_ts(),
                "end_ts": session.end_ts(),
                "files": files,
                "context_store": session.context_store()?,
            }));
        }

        let (coverage, summary) = match contents.coverage()? {
            Some(segment) => {
                let hit_counts = segment.hit_counts()?;
                let coverage = json!({
                    "hit_counts": hit_counts,
                    "per_test": segment.per_test()?,
                });
                (coverage, ProjectSummary::new(contents, hit_counts)?)
            },
            None => (serde_json::Value::Null, ProjectSummary::new(contents, &[])?),
        };

        Ok(json!({
            "header": contents.header(),
            "sessions": sessions,
            "coverage": coverage,
            "summary": summary,
        }))
    })?;
    serde_json::to_writer_pretty(stdout(), &dumped)?;
    Ok(())
}
