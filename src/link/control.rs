// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link-layer control byte: direction, primary/secondary, FCB/FCV, function code.

use super::FrameError;

/// Primary-station (`PRM=1`) function codes this core emits or decodes.
///
/// Secondary-station (`PRM=0`) responses share the same 4-bit code space but
/// a disjoint meaning, so [`LinkFunction`] carries both and is interpreted
/// relative to the `PRM` bit it was read alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFunction {
    /// Primary: reset the remote link's FCB state.
    ResetLinkStates,
    /// Primary: verify the link is active without resetting state.
    TestLinkStates,
    /// Primary: user data requiring a link-layer ACK/NACK.
    ConfirmedUserData,
    /// Primary: user data with no link-layer acknowledgement (the default transport path).
    UnconfirmedUserData,
    /// Secondary: positive acknowledgement.
    Ack,
    /// Secondary: negative acknowledgement (link busy / FCB mismatch).
    Nack,
    /// Secondary: response to a link-status request.
    LinkStatus,
}

impl LinkFunction {
    /// Encode as the 4-bit wire function code for the given `prm` bit.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::ResetLinkStates => 0x00,
            Self::TestLinkStates => 0x02,
            Self::ConfirmedUserData => 0x03,
            Self::UnconfirmedUserData => 0x04,
            Self::Ack => 0x00,
            Self::Nack => 0x01,
            Self::LinkStatus => 0x0B,
        }
    }

    /// Whether this function is sent by the primary (initiating) station.
    #[must_use]
    pub fn is_primary(self) -> bool {
        matches!(
            self,
            Self::ResetLinkStates
                | Self::TestLinkStates
                | Self::ConfirmedUserData
                | Self::UnconfirmedUserData
        )
    }

    /// Decode a 4-bit function code in the context of the `prm` bit.
    pub fn from_code(code: u8, prm: bool) -> Result<Self, FrameError> {
        if prm {
            match code {
                0x00 => Ok(Self::ResetLinkStates),
                0x02 => Ok(Self::TestLinkStates),
                0x03 => Ok(Self::ConfirmedUserData),
                0x04 => Ok(Self::UnconfirmedUserData),
                _ => Err(FrameError::UnsupportedFunction(code, prm)),
            }
        } else {
            match code {
                0x00 => Ok(Self::Ack),
                0x01 => Ok(Self::Nack),
                0x0B => Ok(Self::LinkStatus),
                _ => Err(FrameError::UnsupportedFunction(code, prm)),
            }
        }
    }
}

/// Decoded link-layer control byte.
///
/// Bit layout: `DIR(7) PRM(6) FCB(5) FCV/DFC(4) FUNCTION(3..0)`. `FCB`/`FCV`
/// only carry meaning when `prm` is set; on a secondary frame bit 5 is
/// reserved (always clear on encode) and bit 4 is the data-flow-control bit,
/// which this core always reports as clear (no flow-control backpressure
/// signalling is implemented).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    /// Direction: true if sent from the master's perspective (DIR=1 by convention for this station's outbound primary frames).
    pub dir: bool,
    /// Primary message bit: true for requests/user-data, false for link responses.
    pub prm: bool,
    /// Frame Count Bit: toggles each new confirmed-user-data transmission.
    pub fcb: bool,
    /// Frame Count Valid: true when `fcb` should be checked by the receiver.
    pub fcv: bool,
    pub function: LinkFunction,
}

impl Control {
    /// Build a primary control byte for `function` (must be a primary function).
    #[must_use]
    pub fn primary(dir: bool, fcb: bool, fcv: bool, function: LinkFunction) -> Self {
        debug_assert!(function.is_primary());
        Self {
            dir,
            prm: true,
            fcb,
            fcv,
            function,
        }
    }

    /// Build a secondary (response) control byte for `function` (must be secondary).
    #[must_use]
    pub fn secondary(dir: bool, function: LinkFunction) -> Self {
        debug_assert!(!function.is_primary());
        Self {
            dir,
            prm: false,
            fcb: false,
            fcv: false,
            function,
        }
    }

    #[must_use]
    pub fn to_byte(self) -> u8 {
        let mut byte = self.function.code() & 0x0F;
        if self.dir {
            byte |= 0x80;
        }
        if self.prm {
            byte |= 0x40;
            if self.fcb {
                byte |= 0x20;
            }
            if self.fcv {
                byte |= 0x10;
            }
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Result<Self, FrameError> {
        let dir = byte & 0x80 != 0;
        let prm = byte & 0x40 != 0;
        let fcb = prm && (byte & 0x20 != 0);
        let fcv = prm && (byte & 0x10 != 0);
        let function = LinkFunction::from_code(byte & 0x0F, prm)?;
        Ok(Self {
            dir,
            prm,
            fcb,
            fcv,
            function,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_unconfirmed_user_data() {
        let c = Control::primary(true, false, false, LinkFunction::UnconfirmedUserData);
        let byte = c.to_byte();
        assert_eq!(Control::from_byte(byte).expect("decode"), c);
    }

    #[test]
    fn roundtrip_confirmed_user_data_with_fcb() {
        let c = Control::primary(true, true, true, LinkFunction::ConfirmedUserData);
        let byte = c.to_byte();
        let decoded = Control::from_byte(byte).expect("decode");
        assert!(decoded.fcb);
        assert!(decoded.fcv);
        assert_eq!(decoded.function, LinkFunction::ConfirmedUserData);
    }

    #[test]
    fn secondary_ack_ignores_fcb_fcv_bits() {
        let c = Control::secondary(false, LinkFunction::Ack);
        assert_eq!(c.to_byte() & 0x30, 0);
    }

    #[test]
    fn unsupported_function_code_rejected() {
        // PRM=1, function code 0x0F is not in scope.
        assert!(matches!(
            Control::from_byte(0x4F),
            Err(FrameError::UnsupportedFunction(0x0F, true))
        ));
    }
}
