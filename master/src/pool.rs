use async_channel::{Receiver, Sender};
use common::WorkerAddr;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
#[error("el pool de workers está cerrado")]
pub struct PoolClosed;

/// Pool compartido de workers libres.
///
/// Es una cola MPMC sin límite: `take` espera mientras esté vacía y `put`
/// nunca bloquea. Un worker puede estar en el pool más de una vez si se
/// registró de nuevo; eso sólo significa que puede recibir dos tareas
/// seguidas.
#[derive(Clone)]
pub struct WorkerPool {
    tx: Sender<WorkerAddr>,
    rx: Receiver<WorkerAddr>,
}

impl WorkerPool {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    /// Mete un worker en el pool sin esperar.
    pub fn put(&self, worker: WorkerAddr) {
        if let Err(e) = self.tx.try_send(worker) {
            warn!(
                "no se pudo devolver el worker {} al pool: pool cerrado",
                e.into_inner()
            );
        }
    }

    /// Devuelve un worker al pool en segundo plano, sin que el que llama
    /// tenga que esperar a que vuelva a estar disponible.
    pub fn give_back(&self, worker: WorkerAddr) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tx.send(worker).await {
                warn!(
                    "no se pudo devolver el worker {} al pool: pool cerrado",
                    e.into_inner()
                );
            }
        });
    }

    /// Saca un worker libre, esperando si no hay ninguno.
    pub async fn take(&self) -> Result<WorkerAddr, PoolClosed> {
        self.rx.recv().await.map_err(|_| PoolClosed)
    }

    /// Workers libres en este momento.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Cierra el pool: los `take` pendientes (y futuros, una vez vacío)
    /// devuelven `PoolClosed`.
    #[cfg(test)]
    pub fn close(&self) -> bool {
        self.tx.close()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn take_espera_hasta_que_hay_un_worker() {
        let pool = WorkerPool::new();

        let p = pool.clone();
        let waiter = tokio::spawn(async move { p.take().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        pool.put("http://w1".to_string());
        let got = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(got.unwrap(), "http://w1");
    }

    #[tokio::test]
    async fn give_back_devuelve_en_segundo_plano() {
        let pool = WorkerPool::new();
        pool.give_back("http://w1".to_string());

        let got = timeout(Duration::from_secs(1), pool.take()).await.unwrap();
        assert_eq!(got.unwrap(), "http://w1");
        assert_eq!(pool.available(), 0);
    }

    #[tokio::test]
    async fn take_en_pool_cerrado_y_vacio_falla() {
        let pool = WorkerPool::new();
        assert!(pool.close());
        assert!(pool.take().await.is_err());
        // put sobre un pool cerrado no hace panic
        pool.put("http://w1".to_string());
    }
}
