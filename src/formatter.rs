//! Output formatters for inspection reports.
//!
//! This module provides trait-based formatters for rendering reports and
//! slice listings in human-readable or JSON form.

use crate::macho::cpu::{cpu_subtype_name, cpu_type_name};
use crate::types::{
    ArchitectureSlice, CommandPayload, Diagnostic, EntryPoint, ImageHeader, LoadCommand,
    ParseReport, SegmentRecord, UniversalInfo,
};
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Trait for formatting inspection reports.
///
/// Implementors render each part of a report; [`ReportFormatter::format_report`]
/// stitches the parts together.
pub trait ReportFormatter {
    /// Format the file path header.
    fn format_file(&self, path: &Path) -> String;

    /// Format the universal-container context.
    fn format_universal(&self, universal: &UniversalInfo) -> Option<String>;

    /// Format the image header.
    fn format_header(&self, header: &ImageHeader) -> Option<String>;

    /// Format the segment table.
    fn format_segments(&self, segments: &[SegmentRecord]) -> Option<String>;

    /// Format the load command list.
    fn format_commands(&self, commands: &[LoadCommand]) -> Option<String>;

    /// Format the entry point.
    fn format_entry(&self, entry: &EntryPoint) -> Option<String>;

    /// Format diagnostics.
    fn format_diagnostics(&self, diagnostics: &[Diagnostic]) -> Option<String>;

    /// Format a universal container's slice table.
    fn format_slices(&self, slices: &[ArchitectureSlice], path: &Path) -> String;

    /// Format the complete report.
    ///
    /// Default implementation concatenates all component outputs.
    fn format_report(&self, report: &ParseReport, path: &Path) -> String {
        let mut parts = vec![self.format_file(path)];

        if let Some(s) = report
            .universal
            .as_ref()
            .and_then(|u| self.format_universal(u))
        {
            parts.push(s);
        }
        parts.extend(self.format_header(&report.header));
        parts.extend(self.format_entry(&report.entry_point));
        parts.extend(self.format_segments(&report.segments));
        parts.extend(self.format_commands(&report.commands));
        parts.extend(self.format_diagnostics(&report.diagnostics));

        parts.join("")
    }
}

/// Human-readable output formatter.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    /// Show every load command and section
    pub verbose: bool,
    /// One summary line per file
    pub quiet: bool,
}

impl HumanFormatter {
    /// Create a new human formatter with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a verbose formatter.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            quiet: false,
        }
    }

    /// Create a quiet formatter.
    pub fn quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }
}

fn arch_label(cpu_type: i32, cpu_subtype: i32) -> String {
    match cpu_subtype_name(cpu_type, cpu_subtype) {
        Some(sub) => format!("{} ({sub})", cpu_type_name(cpu_type)),
        None => cpu_type_name(cpu_type).to_string(),
    }
}

fn describe_payload(payload: &CommandPayload) -> String {
    match payload {
        CommandPayload::Segment(seg) => format!(
            "{} vm 0x{:x}+0x{:x} file 0x{:x}+0x{:x} {}/{} ({} sections)",
            seg.name,
            seg.vm_addr,
            seg.vm_size,
            seg.file_offset,
            seg.file_size,
            seg.init_prot.to_rwx(),
            seg.max_prot.to_rwx(),
            seg.sections.len()
        ),
        CommandPayload::Dylib(d) => format!(
            "{} (current {}, compat {})",
            d.path,
            d.current_version_string(),
            d.compatibility_version_string()
        ),
        CommandPayload::Path(p) => p.path.clone(),
        CommandPayload::Uuid(u) => u.to_string(),
        CommandPayload::Main(m) => {
            format!("entryoff 0x{:x} stacksize 0x{:x}", m.entry_offset, m.stack_size)
        }
        CommandPayload::Thread(t) => {
            let mut s = format!("{} state(s)", t.states.len());
            if let Some(pc) = t.program_counter() {
                let _ = write!(s, ", pc 0x{pc:x}");
            }
            if t.truncated {
                s.push_str(", truncated");
            }
            s
        }
        CommandPayload::Unrecognized => String::new(),
    }
}

impl ReportFormatter for HumanFormatter {
    fn format_file(&self, path: &Path) -> String {
        if self.quiet {
            String::new()
        } else {
            format!("File: {}\n", path.display())
        }
    }

    fn format_universal(&self, universal: &UniversalInfo) -> Option<String> {
        if self.quiet {
            return None;
        }
        let slice = universal.selected_slice()?;
        Some(format!(
            "  Universal:  {} slice(s), selected {} ({}) at 0x{:x}\n",
            universal.slices.len(),
            slice.index,
            arch_label(slice.cpu_type, slice.cpu_subtype),
            slice.file_offset
        ))
    }

    fn format_header(&self, header: &ImageHeader) -> Option<String> {
        if self.quiet {
            return None;
        }

        let mut s = String::new();
        let _ = writeln!(
            s,
            "  CPU:        {}",
            arch_label(header.cpu_type, header.cpu_subtype)
        );
        let _ = writeln!(
            s,
            "  Layout:     {}-bit, {}-endian",
            if header.is_64bit { 64 } else { 32 },
            header.byte_order()
        );
        let _ = writeln!(s, "  File type:  {}", header.file_type_name());
        let _ = writeln!(
            s,
            "  Commands:   {} ({} bytes)",
            header.command_count, header.commands_total_size
        );
        let flags = header.header_flags().names();
        if !flags.is_empty() {
            let _ = writeln!(s, "  Flags:      {}", flags.join(" "));
        }
        Some(s)
    }

    fn format_segments(&self, segments: &[SegmentRecord]) -> Option<String> {
        if segments.is_empty() || self.quiet {
            return None;
        }

        let mut s = String::from("  Segments:\n");
        for seg in segments {
            let _ = writeln!(
                s,
                "    {:16} 0x{:016x}-0x{:016x} {}",
                seg.name,
                seg.vm_addr,
                seg.vm_addr.saturating_add(seg.vm_size),
                seg.init_prot.to_rwx()
            );
            if self.verbose {
                for sect in &seg.sections {
                    let _ = writeln!(
                        s,
                        "      {:16} 0x{:016x} size 0x{:x}",
                        sect.name, sect.addr, sect.size
                    );
                }
            }
        }
        Some(s)
    }

    fn format_commands(&self, commands: &[LoadCommand]) -> Option<String> {
        if commands.is_empty() || self.quiet {
            return None;
        }

        // Without -v only dependencies are listed.
        let mut s = String::new();
        if self.verbose {
            s.push_str("  Load commands:\n");
            for cmd in commands {
                let detail = describe_payload(&cmd.payload);
                let name = if cmd.name() == "LC_OTHER" {
                    format!("0x{:x}", cmd.kind)
                } else {
                    cmd.name().to_string()
                };
                let _ = writeln!(
                    s,
                    "    [{:2}] {:24} {:5} {}",
                    cmd.index, name, cmd.declared_size, detail
                );
            }
        } else {
            for cmd in commands {
                match &cmd.payload {
                    CommandPayload::Dylib(d) => {
                        let _ = writeln!(s, "  Dylib:      {}", d.path);
                    }
                    CommandPayload::Path(p) => {
                        let _ = writeln!(s, "  Path:       {}", p.path);
                    }
                    CommandPayload::Uuid(u) => {
                        let _ = writeln!(s, "  UUID:       {u}");
                    }
                    _ => {}
                }
            }
        }
        (!s.is_empty()).then_some(s)
    }

    fn format_entry(&self, entry: &EntryPoint) -> Option<String> {
        if self.quiet {
            return None;
        }
        Some(format!("  Entry:      {entry}\n"))
    }

    fn format_diagnostics(&self, diagnostics: &[Diagnostic]) -> Option<String> {
        if diagnostics.is_empty() {
            return None;
        }
        let mut s = String::new();
        for diag in diagnostics {
            let _ = writeln!(s, "  [warn] {diag}");
        }
        Some(s)
    }

    fn format_slices(&self, slices: &[ArchitectureSlice], path: &Path) -> String {
        let mut s = String::new();
        if !self.quiet {
            let _ = writeln!(s, "File: {}", path.display());
        }
        for slice in slices {
            let _ = writeln!(
                s,
                "  [{}] {:20} offset 0x{:x} size 0x{:x} align 2^{}",
                slice.index,
                arch_label(slice.cpu_type, slice.cpu_subtype),
                slice.file_offset,
                slice.size,
                slice.align
            );
        }
        s
    }

    fn format_report(&self, report: &ParseReport, path: &Path) -> String {
        if self.quiet {
            // Quiet mode: "path: cpu filetype entry"
            let mut s = format!(
                "{}: {} {} {}\n",
                path.display(),
                report.header.cpu_name(),
                report.header.file_type_name(),
                report.entry_point
            );
            if let Some(diags) = self.format_diagnostics(&report.diagnostics) {
                s.push_str(&diags);
            }
            return s;
        }

        let mut parts = vec![self.format_file(path)];
        if let Some(s) = report
            .universal
            .as_ref()
            .and_then(|u| self.format_universal(u))
        {
            parts.push(s);
        }
        parts.extend(self.format_header(&report.header));
        parts.extend(self.format_entry(&report.entry_point));
        parts.extend(self.format_commands(&report.commands));
        parts.extend(self.format_segments(&report.segments));
        parts.extend(self.format_diagnostics(&report.diagnostics));
        parts.push(String::from("\n"));
        parts.join("")
    }
}

/// JSON output formatter.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    /// Pretty-print JSON
    pub pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonFormatter {
    /// Create a new JSON formatter with pretty printing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact JSON formatter.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut s = rendered.unwrap_or_else(|_| "{}".to_string());
        s.push('\n');
        s
    }
}

impl ReportFormatter for JsonFormatter {
    fn format_file(&self, _path: &Path) -> String {
        String::new() // Handled in format_report
    }

    fn format_universal(&self, _universal: &UniversalInfo) -> Option<String> {
        None
    }

    fn format_header(&self, _header: &ImageHeader) -> Option<String> {
        None
    }

    fn format_segments(&self, _segments: &[SegmentRecord]) -> Option<String> {
        None
    }

    fn format_commands(&self, _commands: &[LoadCommand]) -> Option<String> {
        None
    }

    fn format_entry(&self, _entry: &EntryPoint) -> Option<String> {
        None
    }

    fn format_diagnostics(&self, _diagnostics: &[Diagnostic]) -> Option<String> {
        None
    }

    fn format_slices(&self, slices: &[ArchitectureSlice], path: &Path) -> String {
        #[derive(Serialize)]
        struct SliceJson<'a> {
            #[serde(flatten)]
            slice: &'a ArchitectureSlice,
            cpu_name: &'static str,
            cpu_subtype_name: Option<&'static str>,
        }

        #[derive(Serialize)]
        struct ListJson<'a> {
            file: String,
            slices: Vec<SliceJson<'a>>,
        }

        self.render(&ListJson {
            file: path.display().to_string(),
            slices: slices
                .iter()
                .map(|slice| SliceJson {
                    slice,
                    cpu_name: slice.cpu_name(),
                    cpu_subtype_name: cpu_subtype_name(slice.cpu_type, slice.cpu_subtype),
                })
                .collect(),
        })
    }

    fn format_report(&self, report: &ParseReport, path: &Path) -> String {
        #[derive(Serialize)]
        struct ReportJson<'a> {
            file: String,
            cpu_name: &'static str,
            file_type_name: &'static str,
            flag_names: Vec<String>,
            entry_address: Option<String>,
            #[serde(flatten)]
            report: &'a ParseReport,
        }

        self.render(&ReportJson {
            file: path.display().to_string(),
            cpu_name: report.header.cpu_name(),
            file_type_name: report.header.file_type_name(),
            flag_names: report.header.header_flags().names(),
            entry_address: report.entry_point.address().map(|a| format!("0x{a:x}")),
            report,
        })
    }
}
