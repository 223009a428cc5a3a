//! Keystore served from a dedicated thread
//!
//! A [`KeystoreServer`] owns a keystore on its own thread and answers typed
//! requests one at a time over a channel. [`RemoteKeystore`] is the client
//! side and implements [`Keystore`], so callers cannot tell it apart from an
//! in-process keystore.

use super::error::{KeystoreError, KeystoreResult};
use super::transfer;
use super::{Keystore, MAX_KEY_LEN};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use zeroize::Zeroizing;

type Reply<T> = Sender<KeystoreResult<T>>;

enum Request {
    Store {
        name: String,
        data: Zeroizing<Vec<u8>>,
        reply: Reply<()>,
    },
    Load {
        name: String,
        capacity: usize,
        reply: Reply<Zeroizing<Vec<u8>>>,
    },
    Delete {
        name: String,
        reply: Reply<()>,
    },
    Wipe {
        reply: Reply<()>,
    },
    Shutdown,
}

fn serve<K: Keystore>(keystore: K, requests: Receiver<Request>) {
    for request in requests {
        // A dropped reply receiver only means the caller gave up waiting
        match request {
            Request::Store { name, data, reply } => {
                let _ = reply.send(keystore.store_key(&name, &data));
            }
            Request::Load {
                name,
                capacity,
                reply,
            } => {
                let mut buf = Zeroizing::new(vec![0u8; capacity.min(MAX_KEY_LEN)]);
                let result = keystore.load_key(&name, &mut buf).map(|len| {
                    buf.truncate(len);
                    buf
                });
                let _ = reply.send(result);
            }
            Request::Delete { name, reply } => {
                let _ = reply.send(keystore.delete_key(&name));
            }
            Request::Wipe { reply } => {
                let _ = reply.send(keystore.wipe_keystore());
            }
            Request::Shutdown => break,
        }
    }
    debug!(instance = keystore.instance_name(), "Keystore server loop finished");
}

/// Owner of a served keystore. Dropping the server stops it.
pub struct KeystoreServer {
    instance_name: String,
    sender: Sender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl KeystoreServer {
    /// Move `keystore` onto a new server thread
    pub fn spawn<K: Keystore + 'static>(keystore: K) -> KeystoreResult<Self> {
        let instance_name = keystore.instance_name().to_string();
        let (sender, requests) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(format!("keystore-{}", instance_name))
            .spawn(move || serve(keystore, requests))
            .map_err(|e| {
                KeystoreError::Unavailable(format!("failed to start keystore server: {}", e))
            })?;

        info!(instance = %instance_name, "Keystore server started");
        Ok(KeystoreServer {
            instance_name,
            sender,
            handle: Some(handle),
        })
    }

    /// A new client for this server
    pub fn client(&self) -> RemoteKeystore {
        RemoteKeystore {
            instance_name: self.instance_name.clone(),
            sender: Mutex::new(self.sender.clone()),
        }
    }

    /// Stop serving and wait for the server thread to exit
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for KeystoreServer {
    fn drop(&mut self) {
        let _ = self.sender.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!(instance = %self.instance_name, "Keystore server stopped");
    }
}

/// Client of a [`KeystoreServer`]
pub struct RemoteKeystore {
    instance_name: String,
    sender: Mutex<Sender<Request>>,
}

impl RemoteKeystore {
    fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> KeystoreResult<T> {
        let (reply, response) = mpsc::channel();
        self.sender
            .lock()
            .map_err(|_| KeystoreError::Unavailable("client lock poisoned".to_string()))?
            .send(build(reply))
            .map_err(|_| self.unavailable())?;
        response.recv().map_err(|_| self.unavailable())?
    }

    fn unavailable(&self) -> KeystoreError {
        KeystoreError::Unavailable(format!("keystore '{}' is not being served", self.instance_name))
    }
}

impl Keystore for RemoteKeystore {
    fn instance_name(&self) -> &str {
        &self.instance_name
    }

    fn store_key(&self, name: &str, data: &[u8]) -> KeystoreResult<()> {
        let data = Zeroizing::new(data.to_vec());
        self.call(|reply| Request::Store {
            name: name.to_string(),
            data,
            reply,
        })
    }

    fn load_key(&self, name: &str, out: &mut [u8]) -> KeystoreResult<usize> {
        let data = self.call(|reply| Request::Load {
            name: name.to_string(),
            capacity: out.len(),
            reply,
        })?;
        if data.len() > out.len() {
            return Err(KeystoreError::BufferTooSmall {
                required: data.len(),
                capacity: out.len(),
            });
        }
        out[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn delete_key(&self, name: &str) -> KeystoreResult<()> {
        self.call(|reply| Request::Delete {
            name: name.to_string(),
            reply,
        })
    }

    fn wipe_keystore(&self) -> KeystoreResult<()> {
        self.call(|reply| Request::Wipe { reply })
    }

    fn copy_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        transfer::copy_key(self, name, dst)
    }

    fn move_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        transfer::move_key(self, name, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::KeystoreInstance;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn served(name: &str) -> (KeystoreServer, MemoryStorage) {
        let storage = MemoryStorage::new();
        let keystore = KeystoreInstance::new(name, storage.clone()).unwrap();
        (KeystoreServer::spawn(keystore).unwrap(), storage)
    }

    #[test]
    fn test_remote_roundtrip() {
        let (server, storage) = served("remote");
        let client = server.client();

        assert_eq!(client.instance_name(), "remote");
        client.store_key("PrvKey", &[3u8; 64]).unwrap();
        assert!(storage.get_raw("remote/PrvKey").unwrap().is_some());

        let mut out = [0u8; 128];
        let len = client.load_key("PrvKey", &mut out).unwrap();
        assert_eq!(&out[..len], &[3u8; 64]);

        client.delete_key("PrvKey").unwrap();
        assert!(matches!(client.delete_key("PrvKey"), Err(KeystoreError::NotFound(_))));
    }

    #[test]
    fn test_remote_errors_pass_through() {
        let (server, _) = served("remote");
        let client = server.client();

        client.store_key("K", &[1u8; 32]).unwrap();
        assert!(matches!(client.store_key("K", b"x"), Err(KeystoreError::AlreadyExists(_))));
        assert!(matches!(client.store_key("", b"x"), Err(KeystoreError::InvalidParameter(_))));

        let mut small = [0x77u8; 8];
        assert!(matches!(
            client.load_key("K", &mut small),
            Err(KeystoreError::BufferTooSmall { required: 32, capacity: 8 })
        ));
        assert!(small.iter().all(|&b| b == 0x77));
    }

    #[test]
    fn test_remote_wipe() {
        let (server, storage) = served("remote");
        let client = server.client();

        for name in ["A", "B", "C"] {
            client.store_key(name, name.as_bytes()).unwrap();
        }
        client.wipe_keystore().unwrap();
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn test_move_remote_to_local() {
        let (server, _) = served("remote");
        let remote = server.client();
        let local = KeystoreInstance::new("local", MemoryStorage::new()).unwrap();

        remote.store_key("KeyMov", b"over the wire").unwrap();
        remote.move_key("KeyMov", &local).unwrap();

        assert_eq!(local.load_key_vec("KeyMov").unwrap().as_slice(), b"over the wire");
        assert!(matches!(remote.load_key_vec("KeyMov"), Err(KeystoreError::NotFound(_))));
    }

    #[test]
    fn test_stopped_server_is_unavailable() {
        let (server, _) = served("remote");
        let client = server.client();
        server.shutdown();

        assert!(matches!(client.store_key("K", b"x"), Err(KeystoreError::Unavailable(_))));
        let mut out = [0u8; 4];
        assert!(matches!(client.load_key("K", &mut out), Err(KeystoreError::Unavailable(_))));
    }

    #[test]
    fn test_concurrent_clients_are_serialized() {
        let (server, _) = served("remote");
        let shared = Arc::new(server.client());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let client = Arc::clone(&shared);
                std::thread::spawn(move || client.store_key(&format!("key{}", i), &[i as u8; 16]))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        for i in 0..8 {
            let data = shared.load_key_vec(&format!("key{}", i)).unwrap();
            assert_eq!(data.as_slice(), &[i as u8; 16]);
        }
    }
}
