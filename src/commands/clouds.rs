use crate::errors::Result;
use cloud_select_clouds::CLOUD_NAMES;

pub fn handle_clouds() -> Result<()> {
    for name in CLOUD_NAMES {
        println!("{}", name);
    }
    Ok(())
}
