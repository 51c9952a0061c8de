use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
mod auth;
use iamages_lock::{
    FsTransport, ImageMetadata, ImageRef, LockChange, LockClient, LockError, LockPlaintext,
    StaticCredentials, default_root,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

type Client = LockClient<FsTransport, StaticCredentials>;

#[derive(Debug, Parser)]
#[command(name = "iamages-lock")]
#[command(version, about = "Lock, unlock and read password-protected Iamages images.")]
struct Cli {
    /// Directory holding the images
    #[arg(long, global = true, value_name = "PATH", env = "IAMAGES_LOCK_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Adds an unlocked image
    #[command(arg_required_else_help = true)]
    Import {
        id: String,
        /// Image file to import
        image: PathBuf,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 0)]
        width: u32,
        #[arg(long, default_value_t = 0)]
        height: u32,
        /// Real MIME type of the image
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Shows the lock state of an image
    #[command(arg_required_else_help = true)]
    Info { id: String },

    /// Prints the (decrypted) metadata of an image as JSON
    #[command(arg_required_else_help = true)]
    Metadata { id: String },

    /// Writes the (decrypted) image bytes to a file
    #[command(arg_required_else_help = true)]
    Image {
        id: String,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Changes the description of an image
    #[command(arg_required_else_help = true)]
    Describe { id: String, description: String },

    /// Marks an image private or public
    #[command(arg_required_else_help = true)]
    Privacy {
        id: String,
        #[arg(action = clap::ArgAction::Set)]
        private: bool,
    },

    /// Locks an image with a new password
    #[command(arg_required_else_help = true)]
    Lock { id: String },

    /// Changes the password of a locked image
    #[command(arg_required_else_help = true)]
    Passwd { id: String },

    /// Re-locks an image with the latest lock version
    #[command(arg_required_else_help = true)]
    Upgrade { id: String },

    /// Removes the lock from an image
    #[command(arg_required_else_help = true)]
    Unlock { id: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Password for `image`, or an empty one when the image is not locked.
fn password_for(image: &ImageRef) -> Result<Zeroizing<String>> {
    if image.lock().is_locked() {
        auth::read_password()
    } else {
        Ok(Zeroizing::new(String::new()))
    }
}

async fn load_plaintext(client: &Client, image: &ImageRef, password: &str) -> Result<LockPlaintext> {
    let metadata = client.fetch_and_decrypt_metadata(image, password).await?;
    let bytes = client.fetch_and_decrypt_image_bytes(image, password).await?;
    Ok(LockPlaintext {
        metadata: metadata.metadata,
        image: bytes.bytes.to_vec(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    let root = match args.root {
        Some(root) => root,
        None => default_root()?,
    };
    let transport = FsTransport::new(root);
    let client = LockClient::new(transport, StaticCredentials::anonymous());

    match args.command {
        Commands::Import {
            id,
            image,
            description,
            width,
            height,
            content_type,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let mut metadata = ImageMetadata::new(description, width, height);
            if let Some(content_type) = content_type {
                metadata = metadata.with_content_type(content_type);
            }
            client.transport().import(&id, &metadata, &bytes)?;
            println!("imported image '{id}'");
        }
        Commands::Info { id } => {
            let image = client.transport().image_ref(&id)?;
            let lock = image.lock();
            println!("id:         {id}");
            println!("locked:     {}", lock.is_locked());
            if let Some(version) = lock.version() {
                println!("version:    {version}");
                println!("upgradable: {}", lock.is_upgradable());
            }
            println!("private:    {}", client.transport().is_private(&id)?);
        }
        Commands::Metadata { id } => {
            let image = client.transport().image_ref(&id)?;
            let password = password_for(&image)?;
            let metadata = client.fetch_and_decrypt_metadata(&image, &password).await?;
            println!("{}", serde_json::to_string_pretty(&metadata.metadata)?);
        }
        Commands::Image { id, out } => {
            let image = client.transport().image_ref(&id)?;
            let password = password_for(&image)?;
            let decrypted = client.fetch_and_decrypt_image_bytes(&image, &password).await?;
            std::fs::write(&out, decrypted.bytes.as_slice())
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {} bytes to {}", decrypted.bytes.len(), out.display());
        }
        Commands::Describe { id, description } => {
            let image = client.transport().image_ref(&id)?;
            let password = password_for(&image)?;
            let current = client.fetch_and_decrypt_metadata(&image, &password).await?;
            client
                .update_description(&image, &password, &current, &description)
                .await?;
            println!("description of '{id}' updated");
        }
        Commands::Privacy { id, private } => {
            let image = client.transport().image_ref(&id)?;
            client.set_privacy(&image, private).await?;
            println!("image '{id}' is now {}", if private { "private" } else { "public" });
        }
        Commands::Lock { id } => {
            let image = client.transport().image_ref(&id)?;
            if image.lock().is_locked() {
                return Err(LockError::AlreadyLocked.into());
            }
            let plaintext = load_plaintext(&client, &image, "").await?;
            let new_password = auth::read_new_password_with_confirmation()?;
            client
                .commit_lock(&image, LockChange::Enable { new_password }, plaintext)
                .await?;
            println!("image '{id}' locked");
        }
        Commands::Passwd { id } => {
            let image = client.transport().image_ref(&id)?;
            let old_password = auth::read_password()?;
            let plaintext = load_plaintext(&client, &image, &old_password).await?;
            let new_password = auth::read_new_password_with_confirmation()?;
            client
                .commit_lock(
                    &image,
                    LockChange::ChangePassword {
                        old_password,
                        new_password,
                    },
                    plaintext,
                )
                .await?;
            println!("lock password of '{id}' changed");
        }
        Commands::Upgrade { id } => {
            let image = client.transport().image_ref(&id)?;
            if !image.lock().is_upgradable() {
                println!("image '{id}' does not need an upgrade");
                return Ok(());
            }
            let password = auth::read_password()?;
            let plaintext = load_plaintext(&client, &image, &password).await?;
            let lock = client
                .commit_lock(&image, LockChange::Upgrade { password }, plaintext)
                .await?;
            if let Some(version) = lock.version() {
                println!("image '{id}' upgraded to lock {version}");
            }
        }
        Commands::Unlock { id } => {
            let image = client.transport().image_ref(&id)?;
            let old_password = auth::read_password()?;
            let plaintext = load_plaintext(&client, &image, &old_password).await?;
            client
                .commit_lock(&image, LockChange::Disable { old_password }, plaintext)
                .await?;
            println!("image '{id}' unlocked");
        }
    }

    Ok(())
}
