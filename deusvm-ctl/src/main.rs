//! # deusvmctl
//!
//! Command-line client for the DeusVM daemon. Output is tab-separated.
//!
//! ```bash
//! deusvmctl vm create --name web-1 --image ubuntu.qcow2 --cpu 2 --memory 4GB --disk 20GB
//! deusvmctl vm list
//! deusvmctl image create --name ubuntu.qcow2 --source https://example.com/ubuntu.qcow2
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use deusvm_common::{format_size, parse_size};
use deusvm_hypervisor::{ImageRecord, VmRecord};

mod client;

use client::{ApiClient, DEFAULT_ENDPOINT};

/// DeusVM command-line client
#[derive(Parser, Debug)]
#[command(name = "deusvmctl")]
#[command(about = "DeusVM command-line client")]
#[command(version)]
struct Cli {
    /// Daemon REST endpoint
    #[arg(long, global = true, env = "DEUSVM_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Bearer token for the API
    #[arg(long, global = true, env = "DEUSVM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage virtual machines
    #[command(subcommand)]
    Vm(VmCommand),
    /// Manage base images
    #[command(subcommand)]
    Image(ImageCommand),
    /// Manage VM disks
    #[command(subcommand)]
    Disk(DiskCommand),
}

#[derive(Subcommand, Debug)]
enum VmCommand {
    /// Create a VM (not started)
    Create {
        #[arg(long)]
        name: String,
        /// Base image name or path
        #[arg(long)]
        image: String,
        #[arg(long, default_value_t = 1)]
        cpu: u32,
        /// Memory size, e.g. 4GB
        #[arg(long, default_value = "1GB")]
        memory: String,
        /// Disk size, e.g. 20GB
        #[arg(long, default_value = "10GB")]
        disk: String,
    },
    /// List VMs
    List,
    /// Show one VM
    Get {
        #[arg(long)]
        id: String,
    },
    /// Start a VM
    Start {
        #[arg(long)]
        id: String,
    },
    /// Stop a VM
    Stop {
        #[arg(long)]
        id: String,
    },
    /// Delete a VM
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ImageCommand {
    /// Download an image into the repository
    Create {
        /// Image file name
        #[arg(long)]
        name: String,
        /// Source URL
        #[arg(long)]
        source: String,
    },
    /// List images
    List,
    /// Delete an image
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum DiskCommand {
    /// Copy a base image into a new VM disk
    Create {
        /// Base image name
        #[arg(long)]
        base: String,
        /// Disk file name
        #[arg(long)]
        name: String,
        /// Requested size, e.g. 20GB
        #[arg(long, default_value = "10GB")]
        size: String,
    },
}

fn vm_row(vm: &VmRecord) -> String {
    format!("{}\t{}\t{}", vm.id, vm.name, vm.status)
}

fn vm_detail(vm: &VmRecord) -> String {
    format!(
        "{}\t{}\t{} CPU\t{}\t{}",
        vm.id,
        vm.name,
        vm.cpu,
        format_size(vm.memory_bytes),
        vm.status
    )
}

fn image_row(image: &ImageRecord) -> String {
    format!("{}\t{}\t{}", image.name, image.format.as_str(), image.size_bytes)
}

fn check_size(field: &str, value: &str) -> Result<()> {
    parse_size(value).with_context(|| format!("invalid {}", field))?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let client = ApiClient::new(&cli.endpoint, cli.token)?;

    match cli.command {
        Command::Vm(cmd) => match cmd {
            VmCommand::Create { name, image, cpu, memory, disk } => {
                check_size("memory", &memory)?;
                check_size("disk", &disk)?;
                let vm = client.create_vm(&name, &image, cpu, &memory, &disk).await?;
                println!("{}", vm.id);
            }
            VmCommand::List => {
                for vm in client.list_vms().await? {
                    println!("{}", vm_row(&vm));
                }
            }
            VmCommand::Get { id } => {
                let vm = client.get_vm(&id).await?;
                println!("{}", vm_detail(&vm));
            }
            VmCommand::Start { id } => {
                client.start_vm(&id).await?;
                println!("ok");
            }
            VmCommand::Stop { id } => {
                client.stop_vm(&id).await?;
                println!("ok");
            }
            VmCommand::Delete { id } => {
                client.delete_vm(&id).await?;
                println!("ok");
            }
        },
        Command::Image(cmd) => match cmd {
            ImageCommand::Create { name, source } => {
                let image = client.create_image(&name, &source).await?;
                println!("{}\t{}\t{}", image.name, image.size_bytes, image.sha256);
            }
            ImageCommand::List => {
                for image in client.list_images().await? {
                    println!("{}", image_row(&image));
                }
            }
            ImageCommand::Delete { name } => {
                client.delete_image(&name).await?;
                println!("ok");
            }
        },
        Command::Disk(DiskCommand::Create { base, name, size }) => {
            check_size("size", &size)?;
            let path = client.create_disk(&base, &name, &size).await?;
            println!("{}", path);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
