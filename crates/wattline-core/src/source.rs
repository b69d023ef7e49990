// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Seams between the orchestrator and vendor code.

use crate::errors::ComponentResult;
use async_trait::async_trait;
use wattline_types::RawDeviceState;

/// Opens the transport session a device's shared components read over
pub trait Connector: Send + Sync {
    type Session: Send;

    fn connect(&mut self) -> ComponentResult<Self::Session>;

    /// Called exactly once per acquired session, on every exit path
    fn release(&mut self, _session: &mut Self::Session) {}
}

/// Connector for devices whose components need no shared session
#[derive(Debug, Clone, Copy, Default)]
pub struct Sessionless;

impl Connector for Sessionless {
    type Session = ();

    fn connect(&mut self) -> ComponentResult<()> {
        Ok(())
    }
}

/// Holds an acquired session and releases it when dropped
#[derive(Debug)]
pub struct SessionGuard<'a, C: Connector> {
    connector: &'a mut C,
    session: C::Session,
}

impl<'a, C: Connector> SessionGuard<'a, C> {
    pub fn acquire(connector: &'a mut C) -> ComponentResult<Self> {
        let session = connector.connect()?;
        Ok(Self { connector, session })
    }

    pub fn session_mut(&mut self) -> &mut C::Session {
        &mut self.session
    }
}

impl<C: Connector> Drop for SessionGuard<'_, C> {
    fn drop(&mut self) {
        self.connector.release(&mut self.session);
    }
}

/// Component that reads over its device's shared session
pub trait TelemetrySource<S>: Send + Sync {
    fn read_raw(&mut self, session: &mut S) -> ComponentResult<RawDeviceState>;
}

/// Component with its own per-call asynchronous transport
#[async_trait]
pub trait AsyncTelemetrySource: Send + Sync {
    async fn read_raw(&mut self) -> ComponentResult<RawDeviceState>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ComponentError;

    #[derive(Debug, Default)]
    struct CountingConnector {
        opened: u32,
        released: u32,
        refuse: bool,
    }

    impl Connector for CountingConnector {
        type Session = u32;

        fn connect(&mut self) -> ComponentResult<u32> {
            if self.refuse {
                return Err(ComponentError::transport("connection refused"));
            }
            self.opened += 1;
            Ok(self.opened)
        }

        fn release(&mut self, _session: &mut u32) {
            self.released += 1;
        }
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let mut connector = CountingConnector::default();
        {
            let mut guard = SessionGuard::acquire(&mut connector).unwrap();
            assert_eq!(*guard.session_mut(), 1);
        }
        assert_eq!(connector.released, 1);
    }

    #[test]
    fn test_failed_acquire_releases_nothing() {
        let mut connector = CountingConnector {
            refuse: true,
            ..Default::default()
        };
        assert!(SessionGuard::acquire(&mut connector).is_err());
        assert_eq!(connector.released, 0);
    }
}
