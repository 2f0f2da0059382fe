//! The `ls-refs` command.
//!
//! Arguments:
//! - `peel`: follow each annotated tag with a `<oid> <name>^{}` line
//! - `symrefs`: append the symref target to symbolic references
//! - `ref-pattern <suffix>`: only list references whose name ends in
//!   `/<suffix>` (glob); any matching pattern is enough
//!
//! Unknown arguments are ignored.

use std::io::Write;

use gix::bstr::BStr;
use gix::glob::wildmatch;

use crate::context::ServeContext;
use crate::errors::ServeError;
use crate::pkt::{write_flush, write_pkt_line};
use crate::refs::{RefEntry, RefStore};
use crate::request::RequestKeys;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LsRefsOptions {
    pub peel: bool,
    pub symrefs: bool,
    pub patterns: Vec<String>,
}

impl LsRefsOptions {
    pub fn parse(args: &[String]) -> Self {
        let mut opts = LsRefsOptions::default();
        for arg in args {
            if arg == "peel" {
                opts.peel = true;
            } else if arg == "symrefs" {
                opts.symrefs = true;
            } else if let Some(suffix) = arg.strip_prefix("ref-pattern ") {
                opts.patterns.push(format!("*/{suffix}"));
            }
        }
        opts
    }

    /// No patterns match everything. Otherwise `/<refname>` has to match at
    /// least one of them.
    pub fn matches(&self, refname: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let path = format!("/{refname}");
        self.patterns
            .iter()
            .any(|pattern| wildmatch(BStr::new(pattern), BStr::new(&path), wildmatch::Mode::empty()))
    }
}

pub fn ls_refs(
    ctx: &ServeContext<'_>,
    _keys: &RequestKeys,
    args: &[String],
    out: &mut dyn Write,
) -> Result<(), ServeError> {
    let opts = LsRefsOptions::parse(args);
    let refs = ctx.refs();

    let mut send = |entry: RefEntry| send_ref(refs, &opts, &entry, out);
    refs.head(&mut send)?;
    refs.for_each_ref(&mut send)?;

    write_flush(out)
}

fn send_ref(
    refs: &dyn RefStore,
    opts: &LsRefsOptions,
    entry: &RefEntry,
    out: &mut dyn Write,
) -> Result<(), ServeError> {
    if !opts.matches(&entry.name) {
        return Ok(());
    }

    let display_name = refs.strip_namespace(&entry.name);
    let mut line = format!("{} {}", entry.oid, display_name);
    if opts.symrefs && entry.symbolic {
        let target = refs.resolve_symref(&entry.name)?.ok_or_else(|| {
            ServeError::Invariant(format!("'{}' is a symref but it is not?", entry.name))
        })?;
        line.push(' ');
        line.push_str(&target);
    }
    line.push('\n');
    write_pkt_line(out, line.as_bytes())?;

    if opts.peel {
        if let Some(peeled) = refs.peel_tag(&entry.name)? {
            write_pkt_line(out, format!("{peeled} {display_name}^{{}}\n").as_bytes())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use gix::ObjectId;

    use super::*;
    use crate::pkt::{Packet, PacketReader};
    use crate::refs::{MemoryRefStore, RefVisitor};

    fn oid(fill: u8) -> ObjectId {
        ObjectId::from_hex(format!("{:02x}", fill).repeat(20).as_bytes()).unwrap()
    }

    fn hex(fill: u8) -> String {
        format!("{:02x}", fill).repeat(20)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_store() -> MemoryRefStore {
        let mut store = MemoryRefStore::new();
        store
            .insert_symref("HEAD", "refs/heads/main")
            .insert_ref("refs/heads/main", oid(1))
            .insert_ref("refs/heads/mainX", oid(2))
            .insert_ref("refs/remotes/origin/main", oid(3))
            .insert_symref("refs/remotes/origin/HEAD", "refs/remotes/origin/main")
            .insert_ref("refs/tags/v1", oid(0xa1))
            .insert_ref("refs/tags/light", oid(1))
            .insert_tag(oid(0xa1), oid(1));
        store
    }

    fn lines(store: &dyn RefStore, argv: &[&str]) -> Vec<String> {
        let ctx = ServeContext::new(store);
        let mut out = Vec::new();
        ls_refs(&ctx, &RequestKeys::default(), &args(argv), &mut out).unwrap();

        let mut reader = PacketReader::new(&out[..]);
        let mut lines = Vec::new();
        loop {
            match reader.read().unwrap() {
                Packet::Line(l) => lines.push(l),
                Packet::Flush => break,
                other => panic!("unexpected packet {other:?}"),
            }
        }
        assert_eq!(reader.read().unwrap(), Packet::Eof);
        lines
    }

    #[test]
    fn parse_collects_flags_and_patterns() {
        let opts = LsRefsOptions::parse(&args(&[
            "peel",
            "ref-pattern main",
            "unknown",
            "ref-pattern tags/*",
            "symrefs",
            "ref-patternmissing-space",
        ]));
        assert!(opts.peel);
        assert!(opts.symrefs);
        assert_eq!(opts.patterns, ["*/main", "*/tags/*"]);
    }

    #[test]
    fn empty_pattern_set_matches_everything() {
        let opts = LsRefsOptions::default();
        assert!(opts.matches("refs/heads/anything"));
        assert!(opts.matches("HEAD"));
    }

    #[test]
    fn suffix_patterns_match_on_component_boundary() {
        let opts = LsRefsOptions::parse(&args(&["ref-pattern main"]));
        assert!(opts.matches("refs/heads/main"));
        assert!(opts.matches("refs/remotes/origin/main"));
        assert!(!opts.matches("refs/heads/mainX"));
        assert!(!opts.matches("refs/heads/xmain"));
    }

    #[test]
    fn any_pattern_is_enough() {
        let opts = LsRefsOptions::parse(&args(&["ref-pattern main", "ref-pattern v1"]));
        assert!(opts.matches("refs/heads/main"));
        assert!(opts.matches("refs/tags/v1"));
        assert!(!opts.matches("refs/heads/dev"));
    }

    #[test]
    fn lists_head_first_then_store_order() {
        let store = sample_store();
        assert_eq!(
            lines(&store, &[]),
            [
                format!("{} HEAD", hex(1)),
                format!("{} refs/heads/main", hex(1)),
                format!("{} refs/heads/mainX", hex(2)),
                format!("{} refs/remotes/origin/HEAD", hex(3)),
                format!("{} refs/remotes/origin/main", hex(3)),
                format!("{} refs/tags/light", hex(1)),
                format!("{} refs/tags/v1", hex(0xa1)),
            ]
        );
    }

    #[test]
    fn symrefs_append_target_only_when_requested() {
        let store = sample_store();
        for line in lines(&store, &[]) {
            assert_eq!(line.split(' ').count(), 2, "{line}");
        }

        let with = lines(&store, &["symrefs"]);
        assert_eq!(with[0], format!("{} HEAD refs/heads/main", hex(1)));
        assert!(with.contains(&format!(
            "{} refs/remotes/origin/HEAD refs/remotes/origin/main",
            hex(3)
        )));
        assert!(with.contains(&format!("{} refs/heads/main", hex(1))));
    }

    #[test]
    fn peel_line_follows_its_tag() {
        let store = sample_store();
        let out = lines(&store, &["peel", "ref-pattern tags/*"]);
        assert_eq!(
            out,
            [
                format!("{} refs/tags/light", hex(1)),
                format!("{} refs/tags/v1", hex(0xa1)),
                format!("{} refs/tags/v1^{{}}", hex(1)),
            ]
        );
    }

    #[test]
    fn filtered_listing_skips_non_matching() {
        let store = sample_store();
        assert_eq!(
            lines(&store, &["ref-pattern main"]),
            [
                format!("{} refs/heads/main", hex(1)),
                format!("{} refs/remotes/origin/main", hex(3)),
            ]
        );
    }

    #[test]
    fn namespaced_names_are_stripped_but_matched_in_full() {
        let mut store = MemoryRefStore::with_namespace("tenant");
        store
            .insert_symref("refs/namespaces/tenant/HEAD", "refs/namespaces/tenant/refs/heads/main")
            .insert_ref("refs/namespaces/tenant/refs/heads/main", oid(4))
            .insert_ref("refs/heads/main", oid(5));

        assert_eq!(
            lines(&store, &["symrefs"]),
            [
                format!("{} HEAD refs/namespaces/tenant/refs/heads/main", hex(4)),
                format!("{} refs/heads/main", hex(4)),
            ]
        );
        // The pattern sees the unstripped name.
        assert_eq!(lines(&store, &["ref-pattern tenant/HEAD"]), [format!("{} HEAD", hex(4))]);
    }

    #[test]
    fn empty_repository_sends_only_flush() {
        let store = MemoryRefStore::new();
        assert!(lines(&store, &["symrefs", "peel"]).is_empty());
    }

    // Claims a symbolic ref that cannot be resolved.
    struct LyingStore;

    impl RefStore for LyingStore {
        fn namespace_prefix(&self) -> &str {
            ""
        }
        fn head(&self, _visit: &mut RefVisitor<'_>) -> Result<(), ServeError> {
            Ok(())
        }
        fn for_each_ref(&self, visit: &mut RefVisitor<'_>) -> Result<(), ServeError> {
            visit(RefEntry { name: "refs/heads/ghost".into(), oid: oid(7), symbolic: true })
        }
        fn resolve_symref(&self, _name: &str) -> Result<Option<String>, ServeError> {
            Ok(None)
        }
        fn peel_tag(&self, _name: &str) -> Result<Option<ObjectId>, ServeError> {
            Ok(None)
        }
    }

    #[test]
    fn unresolvable_symref_is_an_invariant_violation() {
        let store = LyingStore;
        let ctx = ServeContext::new(&store);
        let mut out = Vec::new();
        let err = ls_refs(&ctx, &RequestKeys::default(), &args(&["symrefs"]), &mut out).unwrap_err();
        assert!(matches!(err, ServeError::Invariant(_)));
        assert!(!err.is_client_error());

        // Without symrefs the flag is never consulted.
        let mut out = Vec::new();
        ls_refs(&ctx, &RequestKeys::default(), &[], &mut out).unwrap();
    }
}
