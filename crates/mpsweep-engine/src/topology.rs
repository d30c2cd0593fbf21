//! `multipath -ll` output parser.
//!
//! The listing is a sequence of sections, one per aggregate device:
//!
//! ```text
//! 36006016020d03200bb93e048f733e411 dm-0 DGC,VRAID
//! size=1.0G features='1 queue_if_no_path' hwhandler='1 alua' wp=rw
//! |-+- policy='round-robin 0' prio=130 status=active
//! | |- 3:0:0:2 sdd 8:48  active ready  running
//! | `- 5:0:0:2 sdj 8:144 active ready  running
//! `-+- policy='round-robin 0' prio=10 status=enabled
//!   |- 4:0:0:2 sdg 8:96  active ready  running
//!   `- 6:0:0:2 sdm 8:192 active ready  running
//! ```
//!
//! Parsing is line oriented: a header line opens a section, the last-branch
//! line (two spaces then `` `- ``) closes it. Headers without the
//! comma-separated vendor/product field are partial dumps and are skipped
//! along with their body. A section that is never closed is dropped.

use regex::Regex;
use tracing::debug;

use mpsweep_core::{AggregateDevice, MemberPath, ScsiAddress};

#[derive(Debug, Clone)]
pub struct TopologyParser {
    header: Regex,
    dm_name: Regex,
    last_branch: Regex,
    member: Regex,
}

struct Header {
    identity: String,
    alias: Option<String>,
    dm_name: Option<String>,
    has_vendor_field: bool,
}

struct OpenSection {
    header: Header,
    lines: Vec<String>,
    members: Vec<MemberPath>,
}

impl OpenSection {
    fn finish(self) -> AggregateDevice {
        AggregateDevice {
            identity: self.header.identity,
            alias: self.header.alias,
            dm_name: self.header.dm_name,
            raw_section: self.lines.join("\n"),
            member_path_lines: self.members,
        }
    }
}

impl TopologyParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            header: Regex::new(
                r"^(?:(?P<alias>[^\s(]+)\s+\()?(?P<identity>[0-9a-fA-F]{30,})\)?(?P<rest>\s.*)?$",
            )?,
            dm_name: Regex::new(r"\b(dm-\d+)\b")?,
            last_branch: Regex::new(r"^[\s|]*\s{2}`-")?,
            member: Regex::new(
                r"[|`]- (?:(?P<h>\d+):(?P<c>\d+):(?P<t>\d+):(?P<l>\d+)|#:#:#:#)\s+(?P<dev>\S+)",
            )?,
        })
    }

    /// Split a full listing into aggregate devices, in listing order.
    pub fn parse(&self, listing: &str) -> Vec<AggregateDevice> {
        let mut devices = Vec::new();
        let mut current: Option<OpenSection> = None;

        for line in listing.lines() {
            if let Some(header) = self.parse_header(line) {
                if let Some(open) = current.take() {
                    debug!(identity = %open.header.identity, "dropping unterminated multipath section");
                }
                if header.has_vendor_field {
                    current = Some(OpenSection {
                        header,
                        lines: vec![line.to_string()],
                        members: Vec::new(),
                    });
                } else {
                    debug!(identity = %header.identity, "skipping multipath section without vendor field");
                }
                continue;
            }

            let Some(section) = current.as_mut() else {
                continue;
            };
            section.lines.push(line.to_string());
            if let Some(member) = self.parse_member(line) {
                section.members.push(member);
            }
            if self.last_branch.is_match(line) {
                if let Some(done) = current.take() {
                    devices.push(done.finish());
                }
            }
        }

        if let Some(open) = current {
            debug!(identity = %open.header.identity, "dropping unterminated multipath section");
        }
        devices
    }

    fn parse_header(&self, line: &str) -> Option<Header> {
        let caps = self.header.captures(line)?;
        let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
        Some(Header {
            identity: caps["identity"].to_string(),
            alias: caps.name("alias").map(|m| m.as_str().to_string()),
            dm_name: self
                .dm_name
                .captures(rest)
                .map(|dm| dm[1].to_string()),
            has_vendor_field: rest.contains(','),
        })
    }

    fn parse_member(&self, line: &str) -> Option<MemberPath> {
        let caps = self.member.captures(line)?;
        // Placeholder is decided by the match alone. An address that fails to
        // parse still counts as a real path.
        let placeholder = caps.name("h").is_none();
        let field = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u64>().ok());
        let address = match (field("h"), field("c"), field("t"), field("l")) {
            (Some(host), Some(channel), Some(target), Some(lun)) => Some(ScsiAddress {
                host,
                channel,
                target,
                lun,
            }),
            _ => None,
        };
        if !placeholder && address.is_none() {
            debug!(line, "member address out of range, keeping path as real");
        }
        let device = if placeholder {
            None
        } else {
            caps.name("dev").map(|m| m.as_str().to_string())
        };
        Some(MemberPath {
            line: line.to_string(),
            placeholder,
            address,
            device,
        })
    }
}
