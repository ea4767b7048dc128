//! mtpcopy CLI - Copy files to, from and between MTP devices
//!
//! Runs every device call through the task executor against a simulated
//! bus loaded from a JSON image.

use clap::Parser;
use mtpcopy::config::{CliArgs, Commands, DeviceSelector, OutputFormat, RuntimeConfig};
use mtpcopy::device::{
    DeviceHandle, FileRecord, MemoryTransport, RawDevice, Transport, FILES_AND_FOLDERS_ROOT,
};
use mtpcopy::error::{MtpError, Result};
use mtpcopy::executor::{
    CopyBetweenDevices, CreateFolder, DeleteObject, DetectRawDevices, DownloadToFile,
    DownloadTree, GetDeviceInfo, GetFileMetadata, GetStorages, ListTree, OpenDevice,
    ReleaseDevice, RenameObject, TaskExecutor, TreeEntry, TreeTally, UploadFromFile, UploadTree,
};
use mtpcopy::progress::ProgressReporter;
use mtpcopy::resolve::DeviceSnapshot;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = RuntimeConfig::from_cli(&args)?;

    let bus = args
        .bus
        .as_deref()
        .ok_or_else(|| MtpError::config("no bus image given (use --bus or MTPCOPY_BUS)"))?;
    let transport = MemoryTransport::load(bus)?
        .with_chunk_sizes(config.bridge.push_chunk, config.bridge.pull_chunk);
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let executor = TaskExecutor::new(transport, &config.executor)?;
    let mut cli = Cli {
        executor,
        config,
        format: args.output_format,
        quiet: args.quiet,
        show_progress: args.progress && !args.quiet,
        devices: None,
        opened: Vec::new(),
    };

    let result = cli.dispatch(&args.command);
    cli.release_all();
    result
}

/// State of one CLI invocation
struct Cli {
    executor: TaskExecutor,
    config: RuntimeConfig,
    format: OutputFormat,
    quiet: bool,
    show_progress: bool,
    /// Detection result, fetched once
    devices: Option<Vec<RawDevice>>,
    /// Sessions to release on exit
    opened: Vec<DeviceHandle>,
}

impl Cli {
    fn dispatch(&mut self, command: &Commands) -> Result<()> {
        match command {
            Commands::Detect => self.cmd_detect(),
            Commands::Info { device } => self.cmd_info(*device),
            Commands::Storages { device } => self.cmd_storages(*device),
            Commands::Ls { device, path, recursive, ignore_hidden } => {
                self.cmd_ls(*device, path, *recursive, *ignore_hidden)
            }
            Commands::Stat { device, path } => self.cmd_stat(*device, path),
            Commands::Resolve { device, path } => self.cmd_resolve(*device, path),
            Commands::Mkdir { device, path } => self.cmd_mkdir(*device, path),
            Commands::Rename { device, path, name } => self.cmd_rename(*device, path, name),
            Commands::Rm { device, path } => self.cmd_rm(*device, path),
            Commands::Get { device, path, local, recursive, ignore_hidden } => {
                self.cmd_get(*device, path, local, *recursive, *ignore_hidden)
            }
            Commands::Put { device, local, folder, name, recursive, ignore_hidden } => {
                self.cmd_put(*device, local, folder, name.clone(), *recursive, *ignore_hidden)
            }
            Commands::Copy { from, path, to, folder, name } => self.cmd_copy(*from, path, *to, folder, name.clone()),
        }
    }

    fn detect(&mut self) -> Result<Vec<RawDevice>> {
        if let Some(devices) = &self.devices {
            return Ok(devices.clone());
        }
        let devices = self.executor.call(DetectRawDevices)?;
        self.devices = Some(devices.clone());
        Ok(devices)
    }

    fn open(&mut self, selector: DeviceSelector) -> Result<DeviceHandle> {
        let devices = self.detect()?;
        let raw = selector
            .pick(&devices)
            .cloned()
            .ok_or_else(|| MtpError::DeviceNotFound(selector.to_string()))?;

        let handle = self.executor.call(OpenDevice {
            raw,
            cached: self.config.bridge.cached,
        })?;
        self.opened.push(handle.clone());
        Ok(handle)
    }

    fn release_all(&mut self) {
        for device in self.opened.drain(..) {
            if let Err(e) = self.executor.call(ReleaseDevice { device }) {
                tracing::warn!("Release failed: {}", e);
            }
        }
    }

    fn snapshot(&self, device: &DeviceHandle) -> Result<DeviceSnapshot> {
        DeviceSnapshot::collect(&self.executor, device, self.config.resolver.max_depth)
    }

    fn resolve(&self, snapshot: &DeviceSnapshot, path: &str) -> Result<u32> {
        snapshot.lookup(path)
    }

    /// Storage to create objects in under `folder`
    fn storage_for(&self, device: &DeviceHandle, snapshot: &DeviceSnapshot, folder: u32) -> Result<u32> {
        if let Some(record) = snapshot.get(folder) {
            if !record.is_folder() {
                return Err(MtpError::WrongObjectType {
                    name: record.name.clone(),
                    found: "file",
                    expected: "folder",
                });
            }
            return Ok(record.storage_id);
        }

        let storages = self.executor.call(GetStorages {
            device: device.clone(),
            sort: self.config.bridge.sort,
        })?;
        storages
            .first()
            .map(|s| s.id)
            .ok_or_else(|| MtpError::NotFound("storage".to_string()))
    }

    fn reporter(&self) -> Arc<ProgressReporter> {
        Arc::new(if self.show_progress {
            ProgressReporter::new()
        } else {
            ProgressReporter::disabled()
        })
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn cmd_detect(&mut self) -> Result<()> {
        let devices = self.detect()?;

        if self.format == OutputFormat::Json {
            return self.print_json(&devices);
        }

        if devices.is_empty() {
            println!("No devices attached");
            return Ok(());
        }
        println!("Found {} device(s):", devices.len());
        for (i, raw) in devices.iter().enumerate() {
            println!(
                "  [{}] {} ({:04x}:{:04x})",
                i,
                raw.label(),
                raw.vendor_id,
                raw.product_id
            );
        }
        Ok(())
    }

    fn cmd_info(&mut self, selector: DeviceSelector) -> Result<()> {
        let device = self.open(selector)?;
        let info = self.executor.call(GetDeviceInfo { device: device.clone() })?;

        if self.format == OutputFormat::Json {
            return self.print_json(&info);
        }

        println!("Device:   {}", device.raw().label());
        println!("Name:     {}", info.friendly_name);
        println!("Model:    {}", info.model_name);
        println!("Serial:   {}", info.serial_number);
        println!("Version:  {}", info.device_version);
        Ok(())
    }

    fn cmd_storages(&mut self, selector: DeviceSelector) -> Result<()> {
        let device = self.open(selector)?;
        let storages = self.executor.call(GetStorages {
            device,
            sort: self.config.bridge.sort,
        })?;

        if self.format == OutputFormat::Json {
            return self.print_json(&storages);
        }

        for storage in &storages {
            println!(
                "{:#010x}  {:<24} {:>10} free of {}",
                storage.id,
                storage.description,
                humansize::format_size(storage.free_space, humansize::BINARY),
                humansize::format_size(storage.max_capacity, humansize::BINARY)
            );
        }
        Ok(())
    }

    fn cmd_ls(&mut self, selector: DeviceSelector, path: &str, recursive: bool, ignore_hidden: bool) -> Result<()> {
        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let folder = self.resolve(&snapshot, path)?;

        if let Some(record) = snapshot.get(folder).filter(|r| !r.is_folder()) {
            return self.print_listing(std::slice::from_ref(record));
        }

        let base = snapshot.folder_path(folder).unwrap_or_else(|| path.to_string());
        let entries = self.executor.call(ListTree {
            device,
            folder,
            path: base,
            recursive,
            ignore_hidden,
            max_depth: self.config.resolver.max_depth,
        })?;
        self.print_tree(&entries, recursive)
    }

    fn print_tree(&self, entries: &[TreeEntry], recursive: bool) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.print_json(&entries);
        }

        for entry in entries {
            entry.walk(&mut |e: &TreeEntry| {
                let label = if recursive { e.path.as_str() } else { e.record.name.as_str() };
                print_row(&e.record, label);
            });
        }
        Ok(())
    }

    fn print_listing(&self, listing: &[FileRecord]) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.print_json(&listing);
        }

        for object in listing {
            print_row(object, &object.name);
        }
        Ok(())
    }

    fn cmd_stat(&mut self, selector: DeviceSelector, path: &str) -> Result<()> {
        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let id = self.resolve(&snapshot, path)?;
        let record = self.executor.call(GetFileMetadata { device, object_id: id })?;

        if self.format == OutputFormat::Json {
            return self.print_json(&record);
        }

        println!("Name:     {}", record.name);
        println!("Id:       {}", record.id);
        println!("Parent:   {}", record.parent_id);
        println!("Storage:  {:#010x}", record.storage_id);
        println!("Type:     {}", record.file_type);
        println!("Size:     {}", humansize::format_size(record.size, humansize::BINARY));
        if let Some(modified) = record.modified {
            println!("Modified: {}", modified.to_rfc3339());
        }
        Ok(())
    }

    fn cmd_resolve(&mut self, selector: DeviceSelector, path: &str) -> Result<()> {
        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let id = self.resolve(&snapshot, path)?;
        println!("{} ({:#x})", id, id);
        Ok(())
    }

    fn cmd_mkdir(&mut self, selector: DeviceSelector, path: &str) -> Result<()> {
        let (parent_path, name) = split_parent(path)?;
        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let parent = self.resolve(&snapshot, parent_path)?;
        let storage = self.storage_for(&device, &snapshot, parent)?;

        let id = self.executor.call(CreateFolder {
            device,
            name: name.to_string(),
            parent,
            storage,
        })?;
        if !self.quiet {
            println!("Created folder {} ({})", path, id);
        }
        Ok(())
    }

    fn cmd_rename(&mut self, selector: DeviceSelector, path: &str, name: &str) -> Result<()> {
        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let id = self.resolve(&snapshot, path)?;
        let file = self.executor.call(GetFileMetadata { device: device.clone(), object_id: id })?;

        let renamed = self.executor.call(RenameObject {
            device,
            file,
            name: name.to_string(),
        })?;
        if !self.quiet {
            println!("Renamed {} to {}", path, renamed.name);
        }
        Ok(())
    }

    fn cmd_rm(&mut self, selector: DeviceSelector, path: &str) -> Result<()> {
        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let id = self.resolve(&snapshot, path)?;
        if id == FILES_AND_FOLDERS_ROOT {
            return Err(MtpError::InvalidName("refusing to delete the root".to_string()));
        }

        self.executor.call(DeleteObject { device, object_id: id })?;
        if !self.quiet {
            println!("Deleted {}", path);
        }
        Ok(())
    }

    fn cmd_get(
        &mut self,
        selector: DeviceSelector,
        path: &str,
        local: &Path,
        recursive: bool,
        ignore_hidden: bool,
    ) -> Result<()> {
        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let id = self.resolve(&snapshot, path)?;

        let reporter = self.reporter();
        reporter.set_status(&format!("Downloading {}", path));

        let outcome = if recursive {
            self.executor.call(DownloadTree {
                device,
                object_id: id,
                destination: local.to_path_buf(),
                ignore_hidden,
                max_depth: self.config.resolver.max_depth,
                progress: Some(reporter.callback()),
            })
        } else {
            self.executor
                .call(DownloadToFile {
                    device,
                    object_id: id,
                    path: local.to_path_buf(),
                    progress: Some(reporter.callback()),
                })
                .map(|bytes| TreeTally { files: 1, folders: 0, bytes })
        };
        let tally = self.finish(&reporter, outcome, path)?;

        if !self.quiet {
            if recursive {
                print_tally("Downloaded", &tally);
            }
            reporter.summary().print();
        }
        Ok(())
    }

    fn cmd_put(
        &mut self,
        selector: DeviceSelector,
        local: &Path,
        folder: &str,
        name: Option<String>,
        recursive: bool,
        ignore_hidden: bool,
    ) -> Result<()> {
        if !recursive && local.is_dir() {
            return Err(MtpError::WrongObjectType {
                name: local.display().to_string(),
                found: "directory",
                expected: "file (use --recursive)",
            });
        }

        let device = self.open(selector)?;
        let snapshot = self.snapshot(&device)?;
        let parent = self.resolve(&snapshot, folder)?;
        let storage = self.storage_for(&device, &snapshot, parent)?;

        let reporter = self.reporter();
        reporter.set_status(&format!("Uploading {}", local.display()));
        let what = local.display().to_string();

        if recursive {
            let outcome = self.executor.call(UploadTree {
                device,
                source: local.to_path_buf(),
                parent,
                storage,
                name,
                ignore_hidden,
                progress: Some(reporter.callback()),
            });
            let tally = self.finish(&reporter, outcome, &what)?;
            if !self.quiet {
                print_tally("Uploaded", &tally);
                reporter.summary().print();
            }
            return Ok(());
        }

        let outcome = self.executor.call(UploadFromFile {
            device,
            path: local.to_path_buf(),
            parent,
            storage,
            name,
            progress: Some(reporter.callback()),
        });
        let record = self.finish(&reporter, outcome, &what)?;

        if !self.quiet {
            println!("Uploaded {} as object {}", record.name, record.id);
            reporter.summary().print();
        }
        Ok(())
    }

    fn cmd_copy(
        &mut self,
        from: DeviceSelector,
        path: &str,
        to: DeviceSelector,
        folder: &str,
        name: Option<String>,
    ) -> Result<()> {
        let source = self.open(from)?;
        let destination = self.open(to)?;

        let source_snapshot = self.snapshot(&source)?;
        let object_id = self.resolve(&source_snapshot, path)?;
        let dest_snapshot = self.snapshot(&destination)?;
        let parent = self.resolve(&dest_snapshot, folder)?;
        let storage = self.storage_for(&destination, &dest_snapshot, parent)?;

        let reporter = self.reporter();
        reporter.set_status(&format!("Copying {}", path));

        let outcome = self.executor.call(CopyBetweenDevices {
            source,
            object_id,
            destination,
            parent,
            storage,
            name,
            progress: Some(reporter.callback()),
        });
        let summary = self.finish(&reporter, outcome, path)?;

        if !self.quiet {
            println!(
                "Copied {} to object {} in {} ({}/s)",
                humansize::format_size(summary.bytes, humansize::BINARY),
                summary.object_id,
                humantime::format_duration(std::time::Duration::from_millis(summary.duration.as_millis() as u64)),
                humansize::format_size(summary.throughput() as u64, humansize::BINARY)
            );
        }
        Ok(())
    }

    fn finish<T>(&self, reporter: &ProgressReporter, outcome: Result<T>, what: &str) -> Result<T> {
        match &outcome {
            Ok(_) => reporter.finish_success(&format!("Done: {}", what)),
            Err(e) => reporter.finish_error(&format!("Failed: {}: {}", what, e)),
        }
        outcome
    }
}

fn print_row(record: &FileRecord, label: &str) {
    let size = if record.is_folder() {
        "-".to_string()
    } else {
        humansize::format_size(record.size, humansize::BINARY)
    };
    println!("{:>8}  {:<7} {:>10}  {}", record.id, record.file_type, size, label);
}

fn print_tally(verb: &str, tally: &TreeTally) {
    println!(
        "{} {} file(s) and {} folder(s), {}",
        verb,
        tally.files,
        tally.folders,
        humansize::format_size(tally.bytes, humansize::BINARY)
    );
}

/// Split `/a/b/name` into (`/a/b`, `name`); the parent of a top-level
/// entry is `/`
fn split_parent(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) if !name.is_empty() => {
            Ok((if parent.is_empty() { "/" } else { parent }, name))
        }
        _ => Err(MtpError::InvalidName(path.to_string())),
    }
}
