use pcap::Linktype;
use tracing::debug;

use crate::capture::CaptureSource;
use crate::error::ListenerError;

/// Link-layer framings `packet::parse_frame` can strip
pub const KNOWN_DATALINKS: [Linktype; 9] = [
    Linktype(0),   // NULL (BSD loopback)
    Linktype(1),   // EN10MB
    Linktype(12),  // RAW
    Linktype(14),  // RAW (OpenBSD)
    Linktype(101), // LINKTYPE_RAW
    Linktype(108), // LOOP
    Linktype(113), // LINUX_SLL
    Linktype(228), // IPV4
    Linktype(229), // IPV6
];

pub fn is_known_datalink(linktype: Linktype) -> bool {
    KNOWN_DATALINKS.contains(&linktype)
}

pub fn datalink_name(linktype: Linktype) -> String {
    linktype
        .get_name()
        .unwrap_or_else(|_| format!("DLT {}", linktype.0))
}

/// Makes sure the source delivers frames in a framing the parser knows,
/// switching to the first known supported datalink if needed.
pub fn ensure_known_datalink<C>(source: &mut C) -> Result<Linktype, ListenerError>
where
    C: CaptureSource + ?Sized,
{
    let current = source.datalink();
    if is_known_datalink(current) {
        return Ok(current);
    }

    let supported = source.supported_datalinks();
    if !supported.is_success() {
        return Err(ListenerError::new("getting supported datalinks", supported.error_message()));
    }
    let supported = supported
        .into_value()
        .map_err(|e| ListenerError::new("getting supported datalinks", e.to_string()))?;

    debug!(
        "Datalink {} not supported by the parser, probing {} alternatives",
        datalink_name(current),
        supported.len()
    );

    let Some(&chosen) = supported.iter().find(|&&linktype| is_known_datalink(linktype)) else {
        return Err(ListenerError::new("getting supported datalinks", "no supported datalinks"));
    };

    source.set_datalink(chosen).into_result("setting supported datalink")?;
    debug!("Switched datalink to {}", datalink_name(chosen));
    Ok(chosen)
}
