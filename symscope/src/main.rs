//! # symscope - Diagnostic Entry Point
//!
//! Resolves addresses of its own process, optionally after `dlopen`ing
//! libraries. The dynamic linker's audit notifications are simulated: every
//! object a `dlopen` newly maps is announced to the service with a cookie of
//! its own, and `--close` announces the matching closes before `dlclose`.

#![allow(unsafe_code)] // dlopen/dlsym/dlclose

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::{CStr, CString};

use symscope::cli::{Args, Target};
use symscope::domain::{ObjectSummary, SourceLocation, ToolError};
use symscope::registry::phdr;
use symscope::{global, Addr2line, Addr2lineConfig, SoHandle};
use symscope_common::AuditCookie;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ToolError>() {
        Some(ToolError::InvalidTarget(_)) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

/// A library opened with `dlopen` and the objects it newly mapped
struct OpenedLibrary {
    path: String,
    handle: *mut libc::c_void,
    cookies: Vec<AuditCookie>,
}

#[derive(Serialize)]
struct Resolution {
    target: String,
    address: String,
    found: bool,
    object: Option<ObjectSummary>,
    location: SourceLocation,
}

#[derive(Serialize)]
struct Listing {
    load_time: Vec<ObjectSummary>,
    run_time: Vec<ObjectSummary>,
    retired: Vec<ObjectSummary>,
}

#[derive(Serialize)]
struct Report {
    resolutions: Vec<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    objects: Option<Listing>,
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns null or a NUL-terminated thread-local string
    unsafe {
        let msg = libc::dlerror();
        if msg.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

fn dlopen(path: &str) -> Result<*mut libc::c_void, ToolError> {
    let c_path = CString::new(path).map_err(|_| ToolError::DlopenFailed {
        path: path.to_string(),
        reason: "path contains a NUL byte".to_string(),
    })?;
    // SAFETY: c_path is a valid C string for the duration of the call
    let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
    if handle.is_null() {
        return Err(ToolError::DlopenFailed { path: path.to_string(), reason: last_dl_error() });
    }
    Ok(handle)
}

/// Look `name` up in the opened libraries first, then in the global scope.
fn dlsym(name: &str, opened: &[OpenedLibrary]) -> Result<usize, ToolError> {
    let c_name = CString::new(name).map_err(|_| ToolError::SymbolNotFound(name.to_string()))?;
    let scopes = opened.iter().map(|lib| lib.handle).chain(std::iter::once(libc::RTLD_DEFAULT));
    for scope in scopes {
        // SAFETY: scope is a live dlopen handle or RTLD_DEFAULT
        let addr = unsafe { libc::dlsym(scope, c_name.as_ptr()) };
        if !addr.is_null() {
            return Ok(addr as usize);
        }
    }
    Err(ToolError::SymbolNotFound(name.to_string()))
}

/// `dlopen` `path` and announce every object it newly mapped.
fn open_library(
    service: &Addr2line,
    path: &str,
    next_cookie: &mut AuditCookie,
) -> Result<OpenedLibrary> {
    let before: HashSet<String> = phdr::loaded_objects().into_iter().map(|o| o.name).collect();
    let handle = dlopen(path)?;

    let mut cookies = Vec::new();
    for object in phdr::loaded_objects().into_iter().filter(|o| !before.contains(&o.name)) {
        *next_cookie += 1;
        match service.object_opened(&object.name, *next_cookie) {
            Some(tracked) => {
                info!("Tracking {} as {}", tracked.name(), tracked.token());
                cookies.push(*next_cookie);
            }
            None => warn!("{} mapped but not tracked", object.name),
        }
    }
    if cookies.is_empty() {
        warn!("{path} mapped nothing new; it resolves as a load-time object if at all");
    }

    Ok(OpenedLibrary { path: path.to_string(), handle, cookies })
}

fn close_library(service: &Addr2line, library: &OpenedLibrary) {
    for cookie in library.cookies.iter().rev() {
        service.object_closed(*cookie);
    }
    // SAFETY: handle came from dlopen and is closed exactly once
    if unsafe { libc::dlclose(library.handle) } != 0 {
        warn!("dlclose {} failed: {}", library.path, last_dl_error());
    }
}

fn resolve(
    service: &Addr2line,
    raw: &str,
    target: &Target,
    opened: &[OpenedLibrary],
) -> Result<Resolution> {
    let addr = match target {
        Target::Address(addr) => *addr,
        Target::Symbol(name) => dlsym(name, opened)?,
    };
    let hit = service.lookup_addr(addr);
    Ok(Resolution {
        target: raw.to_string(),
        address: format!("{addr:#x}"),
        found: hit.found,
        object: hit.object.as_ref().map(ObjectSummary::from),
        location: hit.location,
    })
}

fn summarize(objects: &[SoHandle]) -> Vec<ObjectSummary> {
    objects.iter().map(ObjectSummary::from).collect()
}

fn listing(service: &Addr2line) -> Listing {
    Listing {
        load_time: summarize(&service.loadtime_objects()),
        run_time: summarize(&service.runtime_objects()),
        retired: summarize(&service.retired_objects()),
    }
}

fn print_text(report: &Report) {
    for resolution in &report.resolutions {
        match (&resolution.object, resolution.found) {
            (Some(object), true) => println!(
                "{} ({}) {}\n    in {} [token {}]",
                resolution.target,
                resolution.address,
                resolution.location.describe(),
                object.name,
                object.token
            ),
            _ => println!("{} ({}) <not resolved>", resolution.target, resolution.address),
        }
    }

    if let Some(listing) = &report.objects {
        for (title, objects) in [
            ("load-time", &listing.load_time),
            ("run-time", &listing.run_time),
            ("closed", &listing.retired),
        ] {
            println!("\n{title} objects ({}):", objects.len());
            for object in objects {
                println!(
                    "  {:#014x}-{:#014x} base {:#014x} token {:>5}  {}",
                    object.begin_addr, object.end_addr, object.base_addr, object.token, object.name
                );
            }
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let targets = args
        .targets
        .iter()
        .map(|raw| Target::parse(raw).map(|target| (raw.as_str(), target)))
        .collect::<Result<Vec<_>, _>>()?;

    let config = args
        .ignore
        .iter()
        .fold(Addr2lineConfig::from_env(), |config, pattern| config.ignore(pattern.as_str()));
    let service = global::initialize_with(config);
    service.preinit();
    if !args.quiet {
        eprintln!(
            "Tracking {} load-time objects ({} overlapping pairs)",
            service.loadtime_objects().len(),
            service.overlap_count()
        );
    }

    let mut next_cookie: AuditCookie = 0;
    let mut opened = Vec::new();
    for path in &args.dlopen {
        opened.push(open_library(&service, path, &mut next_cookie)?);
    }

    let resolutions = targets
        .iter()
        .map(|(raw, target)| resolve(&service, raw, target, &opened))
        .collect::<Result<Vec<_>>>()
        .context("Failed to resolve targets")?;

    if args.close {
        for library in opened.iter().rev() {
            close_library(&service, library);
        }
    }

    let report = Report { resolutions, objects: args.list.then(|| listing(&service)) };
    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(ToolError::from)?;
        println!("{json}");
    } else {
        print_text(&report);
    }

    drop(service);
    global::finalize();
    Ok(())
}
