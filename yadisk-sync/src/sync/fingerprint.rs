use std::io;
use std::path::Path;

use md5::Context as Md5Context;
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

/// Streams a local file through MD5, the digest Yandex Disk publishes for
/// every stored file, so equal hex strings mean identical content on both
/// sides.
pub async fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = Md5Context::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}
